//! Compiler collaborator
//!
//! Turns a [`Form`] plus an [`AnalysisEnv`] into an analyzed tree, and an
//! analyzed tree into a JavaScript fragment. The REPL only talks to the
//! [`Compiler`] trait; [`JsCompiler`] is the bundled reference
//! implementation covering the core special forms.
//!
//! # Architecture
//!
//! ```text
//! Form --analyze--> Ast --emit--> Emitted { js, mappings }
//!   ^                                        |
//!   |                                        v
//! reader                           source_map::encode (optional)
//! ```

pub mod analyzer;
pub mod emitter;
pub mod munge;

use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;
use thiserror::Error;

use crate::reader::{Form, FormKind};
use crate::source_map::Mapping;
use crate::util::Position;

pub use munge::{demunge, munge, munge_ns};

/// Namespace of the base runtime, always present in the remote runtime
pub const CORE_NS: &str = "cljs.core";

/// Namespace a session starts in
pub const USER_NS: &str = "cljs.user";

/// Compiler errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("Invalid {special} form at {pos}: {message}")]
    InvalidSpecialForm {
        special: String,
        pos: Position,
        message: String,
    },

    #[error("No such namespace: {ns} at {pos}")]
    NoSuchNamespace { ns: String, pos: Position },

    #[error("Can't call {form} at {pos}")]
    NotCallable { form: String, pos: Position },
}

impl CompileError {
    fn invalid(
        special: &str,
        pos: Position,
        message: impl Into<String>,
    ) -> Self {
        CompileError::InvalidSpecialForm {
            special: special.to_string(),
            pos,
            message: message.into(),
        }
    }
}

/// Result type for compiler operations
pub type CompileResult<T> = Result<T, CompileError>;

/// What the analyzer knows about one namespace
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamespaceInfo {
    /// Namespace name
    pub name: String,
    /// Vars defined with `def`
    pub defs: HashSet<String>,
    /// `:as` aliases (alias -> namespace)
    pub aliases: HashMap<String, String>,
    /// `:refer`-ed names (name -> namespace)
    pub refers: HashMap<String, String>,
    /// Required namespaces, in declaration order
    pub requires: IndexSet<String>,
}

impl NamespaceInfo {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// The analysis environment shared by every form of a session
#[derive(Debug, Clone)]
pub struct AnalysisEnv {
    namespaces: HashMap<String, NamespaceInfo>,
}

impl Default for AnalysisEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisEnv {
    /// Create an environment knowing the core and user namespaces
    pub fn new() -> Self {
        let mut env = Self {
            namespaces: HashMap::new(),
        };
        env.register(CORE_NS);
        env.register(USER_NS);
        env
    }

    /// Register a namespace; returns `true` if it was not known before
    pub fn register(
        &mut self,
        ns: &str,
    ) -> bool {
        if self.namespaces.contains_key(ns) {
            return false;
        }
        self.namespaces.insert(ns.to_string(), NamespaceInfo::new(ns));
        true
    }

    pub fn contains(
        &self,
        ns: &str,
    ) -> bool {
        self.namespaces.contains_key(ns)
    }

    pub fn namespace(
        &self,
        ns: &str,
    ) -> Option<&NamespaceInfo> {
        self.namespaces.get(ns)
    }

    fn namespace_mut(
        &mut self,
        ns: &str,
    ) -> &mut NamespaceInfo {
        self.namespaces
            .entry(ns.to_string())
            .or_insert_with(|| NamespaceInfo::new(ns))
    }
}

/// A namespace declaration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NsDecl {
    /// Declared namespace
    pub name: String,
    /// `:require`-d namespaces
    pub requires: Vec<String>,
    /// `:use`-d namespaces
    pub uses: Vec<String>,
    /// `:require-macros` namespaces (compile time only)
    pub require_macros: Vec<String>,
}

impl NsDecl {
    /// Namespaces the runtime has to load: requires, then distinct uses
    pub fn runtime_deps(&self) -> Vec<String> {
        let mut deps: IndexSet<String> = self.requires.iter().cloned().collect();
        deps.extend(self.uses.iter().cloned());
        deps.into_iter().collect()
    }
}

/// Analyzed tree node
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    pub node: Node,
    pub pos: Position,
}

/// Analyzed node variants
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Scalar literal (nil, boolean, number, string, char, keyword)
    Const(FormKind),
    /// Quoted form
    Quote(Form),
    /// Namespace-level var
    Var { ns: String, name: String },
    /// Local binding (munged)
    Local(String),
    /// `js/` global or dotted host path
    JsGlobal(String),
    Vector(Vec<Ast>),
    Map(Vec<(Ast, Ast)>),
    Set(Vec<Ast>),
    Ns(NsDecl),
    Def {
        ns: String,
        name: String,
        init: Option<Box<Ast>>,
    },
    Do(Vec<Ast>),
    If {
        test: Box<Ast>,
        then: Box<Ast>,
        otherwise: Option<Box<Ast>>,
    },
    Let {
        bindings: Vec<(String, Ast)>,
        body: Vec<Ast>,
    },
    Fn {
        name: Option<String>,
        params: Vec<String>,
        rest: Option<String>,
        body: Vec<Ast>,
    },
    SetBang {
        target: Box<Ast>,
        value: Box<Ast>,
    },
    Throw(Box<Ast>),
    Try {
        body: Vec<Ast>,
        catch: Option<(String, Vec<Ast>)>,
        finally: Vec<Ast>,
    },
    New {
        ctor: Box<Ast>,
        args: Vec<Ast>,
    },
    Method {
        target: Box<Ast>,
        method: String,
        args: Vec<Ast>,
    },
    Field {
        target: Box<Ast>,
        field: String,
    },
    Invoke {
        f: Box<Ast>,
        args: Vec<Ast>,
    },
}

impl Ast {
    pub fn new(
        node: Node,
        pos: Position,
    ) -> Self {
        Self { node, pos }
    }

    /// The namespace declaration, if this is one
    pub fn ns_decl(&self) -> Option<&NsDecl> {
        match &self.node {
            Node::Ns(decl) => Some(decl),
            _ => None,
        }
    }
}

/// Emission options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitOptions {
    /// Record generated -> original position mappings
    pub source_map: bool,
}

/// Generated JavaScript with optional position mappings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Emitted {
    /// JavaScript text
    pub js: String,
    /// Mappings (0-indexed), empty unless requested
    pub mappings: Vec<Mapping>,
    /// Number of generated lines
    pub lines: u32,
}

/// Compiler collaborator interface
pub trait Compiler {
    /// Analyze a form in namespace `ns`
    ///
    /// Namespace declarations and `def`s are recorded in `env`.
    fn analyze(
        &self,
        env: &mut AnalysisEnv,
        ns: &str,
        form: &Form,
    ) -> CompileResult<Ast>;

    /// Generate JavaScript for an analyzed top-level form
    fn emit(
        &self,
        ast: &Ast,
        options: &EmitOptions,
    ) -> CompileResult<Emitted>;
}

/// Reference compiler for the core special forms
#[derive(Debug, Default, Clone, Copy)]
pub struct JsCompiler;

impl JsCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for JsCompiler {
    fn analyze(
        &self,
        env: &mut AnalysisEnv,
        ns: &str,
        form: &Form,
    ) -> CompileResult<Ast> {
        analyzer::Analyzer::new(env, ns).analyze_top(form)
    }

    fn emit(
        &self,
        ast: &Ast,
        options: &EmitOptions,
    ) -> CompileResult<Emitted> {
        Ok(emitter::emit_top(ast, options))
    }
}
