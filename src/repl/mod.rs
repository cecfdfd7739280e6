//! REPL driver
//!
//! Reads forms, dispatches special forms, runs everything else through the
//! evaluation pipeline and prints the outcome.
//!
//! # Loop
//!
//! ```text
//! read ──> :cljs/quit? ──> exit
//!   │
//!   ├──> special form ──> handler (failures printed, loop continues)
//!   │
//!   └──> wrap ─> analyze ─> emit ─> evaluate ─> print value / failure
//! ```
//!
//! Only fatal backend errors and input failures leave the loop early;
//! `tear_down` runs exactly once either way.

pub mod loader;
pub mod options;
pub mod pipeline;
pub mod printer;
pub mod session;
pub mod special;

use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::backends::{BackendError, EvalBackend};
use crate::build::{BuildError, BuildGraph};
use crate::compiler::{AnalysisEnv, CompileError, Compiler};
use crate::reader::{Form, FormReader, LineSource, ReadError, ReadOutcome, Symbol};
use crate::source_map::{SourceMapError, TraceMapper};

pub use options::ReplOptions;
pub use pipeline::{Evaluation, WrapKind};
pub use session::SessionState;
pub use special::SpecialFn;

/// Input that ends the session
pub const QUIT_KEYWORD: (&str, &str) = ("cljs", "quit");

/// Most causes printed for a failed special form
pub const TRACE_DEPTH: usize = 5;

/// File name reported for forms typed at the prompt
pub const REPL_FILENAME: &str = "<cljs repl>";

/// Driver errors
#[derive(Debug, Error)]
pub enum ReplError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    SourceMap(#[from] SourceMapError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File not found: {}", .0.display())]
    MissingSourceFile(PathBuf),

    #[error("Cannot read {}: {source}", path.display())]
    SourceFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid {name} form: {message}")]
    InvalidSpecialForm { name: String, message: String },

    #[error("Failed to load {ns}: {message}")]
    LoadFailed { ns: String, message: String },

    #[error("{0}")]
    EvaluationFailed(String),
}

impl ReplError {
    /// Whether the session has to end
    pub fn is_fatal(&self) -> bool {
        match self {
            ReplError::Backend(e) => e.is_fatal(),
            ReplError::Io(_) => true,
            _ => false,
        }
    }
}

/// Result type for driver operations
pub type ReplResult<T> = Result<T, ReplError>;

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// The quit keyword was read
    Quit,
    /// Input ran out
    EndOfInput,
}

/// A REPL session over one backend
pub struct Repl<B, C, G> {
    backend: B,
    compiler: C,
    graph: G,
    env: AnalysisEnv,
    session: SessionState,
    options: ReplOptions,
    special_fns: HashMap<&'static str, SpecialFn<B, C, G>>,
    /// Namespaces delivered by the dependency loader
    loaded: HashSet<String>,
    tracer: TraceMapper,
}

impl<B: EvalBackend, C: Compiler, G: BuildGraph> Repl<B, C, G> {
    /// Create a driver; `options` are merged under the backend's defaults
    pub fn new(
        backend: B,
        compiler: C,
        graph: G,
        options: ReplOptions,
    ) -> Self {
        let options = match backend.repl_options() {
            Some(defaults) => options.merge_under(defaults),
            None => options,
        };
        let trace_root = options
            .output_dir()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            backend,
            compiler,
            graph,
            env: AnalysisEnv::new(),
            session: SessionState::new(),
            options,
            special_fns: special::builtins(),
            loaded: HashSet::new(),
            tracer: TraceMapper::new(trace_root),
        }
    }

    pub fn options(&self) -> &ReplOptions {
        &self.options
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn env(&self) -> &AnalysisEnv {
        &self.env
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Add or replace a special form
    pub fn register_special(
        &mut self,
        name: &'static str,
        handler: SpecialFn<B, C, G>,
    ) {
        self.special_fns.insert(name, handler);
    }

    /// Prompt for the current namespace
    pub fn prompt(&self) -> String {
        format!("{}=> ", self.session.current_ns())
    }

    /// Set up the backend, run the loop, then tear the backend down
    pub fn run_session<S: LineSource>(
        &mut self,
        source: S,
        out: &mut dyn Write,
    ) -> ReplResult<SessionExit> {
        let result = self.start_and_loop(source, out);
        if let Err(e) = self.backend.tear_down() {
            warn!("Backend tear down failed: {}", e);
        }
        info!("Session ended");
        result
    }

    fn start_and_loop<S: LineSource>(
        &mut self,
        source: S,
        out: &mut dyn Write,
    ) -> ReplResult<SessionExit> {
        self.backend.setup(&self.options)?;
        writeln!(out, "To quit, type: :{}/{}", QUIT_KEYWORD.0, QUIT_KEYWORD.1)?;

        // The user namespace has to exist remotely before anything is defined in it.
        let user_ns = Form::list(
            vec![
                Form::symbol("ns", Default::default()),
                Form::symbol(self.session.current_ns(), Default::default()),
            ],
            Default::default(),
        );
        let evaluation = self.evaluate_form(&user_ns, REPL_FILENAME, WrapKind::Identity, out)?;
        if !evaluation.result.is_success() {
            return Err(ReplError::EvaluationFailed(evaluation.result.value().to_string()));
        }

        self.run(&mut FormReader::new(source), out)
    }

    /// The read-eval-print loop
    pub fn run<S: LineSource>(
        &mut self,
        reader: &mut FormReader<S>,
        out: &mut dyn Write,
    ) -> ReplResult<SessionExit> {
        loop {
            out.flush()?;
            let form = match reader.read(&self.prompt()) {
                Ok(ReadOutcome::LineStart) => continue,
                Ok(ReadOutcome::StreamEnd) => return Ok(SessionExit::EndOfInput),
                Ok(ReadOutcome::Form(form)) => form,
                Err(ReadError::Io(e)) => return Err(e.into()),
                Err(e) => {
                    printer::print_error(out, &e.to_string(), self.options.colors())?;
                    continue;
                }
            };

            if form.is_keyword(Some(QUIT_KEYWORD.0), QUIT_KEYWORD.1) {
                return Ok(SessionExit::Quit);
            }

            let handler = form
                .head_symbol()
                .filter(|s| s.ns.is_none())
                .and_then(|s: &Symbol| self.special_fns.get(s.name.as_str()).copied());
            let result = match handler {
                Some(handler) => handler(self, &form, out).or_else(|e| {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    printer::print_special_failure(out, &e, self.options.colors())?;
                    Ok(())
                }),
                None => self.eval_and_print(&form, out).or_else(|e| {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    printer::print_error(out, &e.to_string(), self.options.colors())?;
                    Ok(())
                }),
            };
            result?;
        }
    }
}

/// Run a whole session over `backend` and return how it ended
pub fn run_session<B, C, G, S>(
    backend: B,
    compiler: C,
    graph: G,
    options: ReplOptions,
    source: S,
    out: &mut dyn Write,
) -> ReplResult<SessionExit>
where
    B: EvalBackend,
    C: Compiler,
    G: BuildGraph,
    S: LineSource,
{
    Repl::new(backend, compiler, graph, options).run_session(source, out)
}
