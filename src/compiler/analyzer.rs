//! Form analysis
//!
//! Resolves symbols against the [`AnalysisEnv`] and checks the shape of the
//! special forms. Resolution order for an unqualified symbol is: local
//! binding, referred name, var of the current namespace, then `cljs.core`.

use super::{munge, AnalysisEnv, Ast, CompileError, CompileResult, Node, NsDecl, CORE_NS};
use crate::reader::{Form, FormKind, Symbol};
use crate::util::Position;

/// Single-form analyzer
pub struct Analyzer<'e> {
    env: &'e mut AnalysisEnv,
    ns: String,
    /// Lexical scope, innermost binding last
    locals: Vec<String>,
}

impl<'e> Analyzer<'e> {
    pub fn new(
        env: &'e mut AnalysisEnv,
        ns: &str,
    ) -> Self {
        env.register(ns);
        Self {
            env,
            ns: ns.to_string(),
            locals: Vec::new(),
        }
    }

    /// Analyze a top-level form; only here may `ns` appear
    pub fn analyze_top(
        &mut self,
        form: &Form,
    ) -> CompileResult<Ast> {
        if form.head_symbol().is_some_and(|s| s.is("ns")) {
            return self.analyze_ns(form);
        }
        self.analyze(form)
    }

    fn analyze(
        &mut self,
        form: &Form,
    ) -> CompileResult<Ast> {
        let pos = form.pos;
        let node = match &form.kind {
            FormKind::Nil
            | FormKind::Bool(_)
            | FormKind::Int(_)
            | FormKind::Float(_)
            | FormKind::Str(_)
            | FormKind::Char(_)
            | FormKind::Keyword(_) => Node::Const(form.kind.clone()),
            FormKind::Symbol(sym) => self.resolve(sym, pos)?,
            FormKind::Vector(items) => Node::Vector(self.analyze_all(items)?),
            FormKind::Set(items) => Node::Set(self.analyze_all(items)?),
            FormKind::Map(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    out.push((self.analyze(k)?, self.analyze(v)?));
                }
                Node::Map(out)
            }
            FormKind::List(items) if items.is_empty() => Node::Quote(form.clone()),
            FormKind::List(items) => return self.analyze_seq(form, items),
        };
        Ok(Ast::new(node, pos))
    }

    fn analyze_all(
        &mut self,
        forms: &[Form],
    ) -> CompileResult<Vec<Ast>> {
        forms.iter().map(|f| self.analyze(f)).collect()
    }

    fn analyze_seq(
        &mut self,
        form: &Form,
        items: &[Form],
    ) -> CompileResult<Ast> {
        let pos = form.pos;
        let args = &items[1..];
        if let Some(sym) = items[0].as_symbol().filter(|s| s.ns.is_none()) {
            if !self.is_local(&sym.name) {
                match sym.name.as_str() {
                    "ns" => {
                        return Err(CompileError::invalid(
                            "ns",
                            pos,
                            "namespace declarations must appear at top level",
                        ))
                    }
                    "def" => return self.analyze_def(args, pos),
                    "do" => return Ok(Ast::new(Node::Do(self.analyze_all(args)?), pos)),
                    "if" => return self.analyze_if(args, pos),
                    "let" | "let*" => return self.analyze_let(args, pos),
                    "fn" | "fn*" => return self.analyze_fn(args, pos),
                    "quote" => return self.analyze_quote(args, pos),
                    "set!" => return self.analyze_set(args, pos),
                    "throw" => return self.analyze_throw(args, pos),
                    "try" => return self.analyze_try(args, pos),
                    "new" => return self.analyze_new(args, pos),
                    "." => return self.analyze_dot(args, pos),
                    _ => {}
                }
                if let Some(member) = sym.name.strip_prefix('.').filter(|m| !m.is_empty()) {
                    return self.analyze_member(member, args, pos);
                }
            }
        }
        if let Some(sym) = items[0].as_symbol() {
            if let Some(ctor) = sym.name.strip_suffix('.').filter(|c| !c.is_empty()) {
                let ctor = Symbol {
                    ns: sym.ns.clone(),
                    name: ctor.to_string(),
                };
                let mut new_args = vec![Form::new(FormKind::Symbol(ctor), items[0].pos)];
                new_args.extend_from_slice(args);
                return self.analyze_new(&new_args, pos);
            }
        }

        let f = self.analyze(&items[0])?;
        if let Node::Const(kind) = &f.node {
            if !matches!(kind, FormKind::Keyword(_)) {
                return Err(CompileError::NotCallable {
                    form: items[0].to_string(),
                    pos,
                });
            }
        }
        let args = self.analyze_all(args)?;
        Ok(Ast::new(
            Node::Invoke {
                f: Box::new(f),
                args,
            },
            pos,
        ))
    }

    fn is_local(
        &self,
        name: &str,
    ) -> bool {
        self.locals.iter().rev().any(|l| l == name)
    }

    /// Resolve a symbol to a local, a var or a host global
    fn resolve(
        &self,
        sym: &Symbol,
        pos: Position,
    ) -> CompileResult<Node> {
        if let Some(ns) = &sym.ns {
            if ns == "js" {
                return Ok(Node::JsGlobal(sym.name.clone()));
            }
            let info = self.env.namespace(&self.ns);
            if let Some(target) = info.and_then(|i| i.aliases.get(ns)) {
                return Ok(Node::Var {
                    ns: target.clone(),
                    name: sym.name.clone(),
                });
            }
            if self.env.contains(ns) || ns == "goog" || ns.starts_with("goog.") {
                return Ok(Node::Var {
                    ns: ns.clone(),
                    name: sym.name.clone(),
                });
            }
            return Err(CompileError::NoSuchNamespace {
                ns: ns.clone(),
                pos,
            });
        }

        let name = &sym.name;
        if self.is_local(name) {
            return Ok(Node::Local(munge(name)));
        }
        if name.len() > 1 && name.contains('.') && !name.ends_with('.') {
            return Ok(Node::JsGlobal(
                name.split('.').map(munge).collect::<Vec<_>>().join("."),
            ));
        }
        let info = self.env.namespace(&self.ns);
        if let Some(target) = info.and_then(|i| i.refers.get(name)) {
            return Ok(Node::Var {
                ns: target.clone(),
                name: name.clone(),
            });
        }
        if info.is_some_and(|i| i.defs.contains(name)) {
            return Ok(Node::Var {
                ns: self.ns.clone(),
                name: name.clone(),
            });
        }
        Ok(Node::Var {
            ns: CORE_NS.to_string(),
            name: name.clone(),
        })
    }

    fn analyze_ns(
        &mut self,
        form: &Form,
    ) -> CompileResult<Ast> {
        let pos = form.pos;
        let items = form.as_list().unwrap_or_default();
        let name = items
            .get(1)
            .and_then(Form::as_symbol)
            .filter(|s| s.ns.is_none())
            .ok_or_else(|| CompileError::invalid("ns", pos, "expected a namespace symbol"))?
            .name
            .clone();

        let mut decl = NsDecl {
            name: name.clone(),
            ..NsDecl::default()
        };
        let mut aliases = Vec::new();
        let mut refers = Vec::new();

        for clause in &items[2..] {
            if clause.as_str().is_some() {
                continue;
            }
            let Some([head, specs @ ..]) = clause.as_list() else {
                return Err(CompileError::invalid(
                    "ns",
                    clause.pos,
                    format!("unsupported clause {}", clause),
                ));
            };
            let Some(kw) = head.as_keyword().filter(|k| k.ns.is_none()) else {
                return Err(CompileError::invalid(
                    "ns",
                    head.pos,
                    "clause must start with a keyword",
                ));
            };
            match kw.name.as_str() {
                "require" | "use" | "require-macros" => {
                    for spec in specs {
                        let lib = parse_libspec(spec, &kw.name)?;
                        if let Some(alias) = lib.alias {
                            aliases.push((alias, lib.ns.clone()));
                        }
                        refers.extend(lib.refers.into_iter().map(|r| (r, lib.ns.clone())));
                        match kw.name.as_str() {
                            "require" => decl.requires.push(lib.ns),
                            "use" => decl.uses.push(lib.ns),
                            _ => decl.require_macros.push(lib.ns),
                        }
                    }
                }
                "refer-clojure" | "import" => {}
                other => {
                    return Err(CompileError::invalid(
                        "ns",
                        head.pos,
                        format!("unsupported clause :{}", other),
                    ))
                }
            }
        }

        // Later declarations of the same namespace add to what is known.
        self.env.register(&name);
        for dep in decl.requires.iter().chain(&decl.uses) {
            self.env.register(dep);
        }
        let info = self.env.namespace_mut(&name);
        info.requires.extend(decl.runtime_deps());
        info.aliases.extend(aliases);
        info.refers.extend(refers);

        Ok(Ast::new(Node::Ns(decl), pos))
    }

    fn analyze_def(
        &mut self,
        args: &[Form],
        pos: Position,
    ) -> CompileResult<Ast> {
        let (name_form, init) = match args {
            [name] => (name, None),
            [name, init] => (name, Some(init)),
            [name, doc, init] if doc.as_str().is_some() => (name, Some(init)),
            _ => return Err(CompileError::invalid("def", pos, "expected (def name init?)")),
        };
        let name = name_form
            .as_symbol()
            .filter(|s| s.ns.is_none())
            .ok_or_else(|| CompileError::invalid("def", pos, "name must be an unqualified symbol"))?
            .name
            .clone();

        self.env.namespace_mut(&self.ns).defs.insert(name.clone());
        let init = match init {
            Some(form) => Some(Box::new(self.analyze(form)?)),
            None => None,
        };
        Ok(Ast::new(
            Node::Def {
                ns: self.ns.clone(),
                name,
                init,
            },
            pos,
        ))
    }

    fn analyze_if(
        &mut self,
        args: &[Form],
        pos: Position,
    ) -> CompileResult<Ast> {
        let (test, then, otherwise) = match args {
            [test, then] => (test, then, None),
            [test, then, otherwise] => (test, then, Some(otherwise)),
            _ => return Err(CompileError::invalid("if", pos, "expected 2 or 3 arguments")),
        };
        let otherwise = match otherwise {
            Some(form) => Some(Box::new(self.analyze(form)?)),
            None => None,
        };
        Ok(Ast::new(
            Node::If {
                test: Box::new(self.analyze(test)?),
                then: Box::new(self.analyze(then)?),
                otherwise,
            },
            pos,
        ))
    }

    fn analyze_let(
        &mut self,
        args: &[Form],
        pos: Position,
    ) -> CompileResult<Ast> {
        let Some((bindings_form, body)) = args.split_first() else {
            return Err(CompileError::invalid("let", pos, "expected a binding vector"));
        };
        let bindings_vec = match &bindings_form.kind {
            FormKind::Vector(items) if items.len() % 2 == 0 => items,
            FormKind::Vector(_) => {
                return Err(CompileError::invalid(
                    "let",
                    bindings_form.pos,
                    "binding vector needs an even number of forms",
                ))
            }
            _ => return Err(CompileError::invalid("let", pos, "expected a binding vector")),
        };

        let scope = self.locals.len();
        let result = (|| -> CompileResult<Ast> {
            let mut bindings = Vec::with_capacity(bindings_vec.len() / 2);
            for pair in bindings_vec.chunks(2) {
                let name = local_name(&pair[0], "let")?;
                let init = self.analyze(&pair[1])?;
                bindings.push((munge(&name), init));
                self.locals.push(name);
            }
            let body = self.analyze_all(body)?;
            Ok(Ast::new(Node::Let { bindings, body }, pos))
        })();
        self.locals.truncate(scope);
        result
    }

    fn analyze_fn(
        &mut self,
        args: &[Form],
        pos: Position,
    ) -> CompileResult<Ast> {
        let (name, rest_args) = match args.first().and_then(Form::as_symbol) {
            Some(_) => (Some(local_name(&args[0], "fn")?), &args[1..]),
            None => (None, args),
        };
        let [params_form, body @ ..] = rest_args else {
            return Err(CompileError::invalid("fn", pos, "expected a parameter vector"));
        };
        let FormKind::Vector(param_forms) = &params_form.kind else {
            return Err(CompileError::invalid(
                "fn",
                params_form.pos,
                "multi-arity functions are not supported",
            ));
        };

        let mut params = Vec::new();
        let mut rest = None;
        let mut iter = param_forms.iter();
        while let Some(param) = iter.next() {
            let p = local_name(param, "fn")?;
            if p == "&" {
                let rest_form = iter.next().ok_or_else(|| {
                    CompileError::invalid("fn", param.pos, "missing rest parameter after &")
                })?;
                rest = Some(local_name(rest_form, "fn")?);
                if iter.next().is_some() {
                    return Err(CompileError::invalid(
                        "fn",
                        param.pos,
                        "only one parameter may follow &",
                    ));
                }
                break;
            }
            params.push(p);
        }

        let scope = self.locals.len();
        self.locals.extend(name.iter().cloned());
        self.locals.extend(params.iter().cloned());
        self.locals.extend(rest.iter().cloned());
        let body = self.analyze_all(body);
        self.locals.truncate(scope);

        Ok(Ast::new(
            Node::Fn {
                name: name.as_deref().map(munge),
                params: params.iter().map(|p| munge(p)).collect(),
                rest: rest.as_deref().map(munge),
                body: body?,
            },
            pos,
        ))
    }

    fn analyze_quote(
        &mut self,
        args: &[Form],
        pos: Position,
    ) -> CompileResult<Ast> {
        match args {
            [quoted] => Ok(Ast::new(Node::Quote(quoted.clone()), pos)),
            _ => Err(CompileError::invalid("quote", pos, "expected exactly one argument")),
        }
    }

    fn analyze_set(
        &mut self,
        args: &[Form],
        pos: Position,
    ) -> CompileResult<Ast> {
        let [target, value] = args else {
            return Err(CompileError::invalid("set!", pos, "expected (set! target value)"));
        };
        let target = self.analyze(target)?;
        if !matches!(
            target.node,
            Node::Var { .. } | Node::Local(_) | Node::JsGlobal(_) | Node::Field { .. }
        ) {
            return Err(CompileError::invalid("set!", pos, "cannot assign to this target"));
        }
        Ok(Ast::new(
            Node::SetBang {
                target: Box::new(target),
                value: Box::new(self.analyze(value)?),
            },
            pos,
        ))
    }

    fn analyze_throw(
        &mut self,
        args: &[Form],
        pos: Position,
    ) -> CompileResult<Ast> {
        match args {
            [value] => Ok(Ast::new(Node::Throw(Box::new(self.analyze(value)?)), pos)),
            _ => Err(CompileError::invalid("throw", pos, "expected exactly one argument")),
        }
    }

    fn analyze_try(
        &mut self,
        args: &[Form],
        pos: Position,
    ) -> CompileResult<Ast> {
        let clause = |form: &Form, name: &str| form.head_symbol().is_some_and(|s| s.is(name));
        let split = args
            .iter()
            .position(|f| clause(f, "catch") || clause(f, "finally"))
            .unwrap_or(args.len());
        let body = self.analyze_all(&args[..split])?;

        let mut catch = None;
        let mut finally = Vec::new();
        for form in &args[split..] {
            let items = form.as_list().unwrap_or_default();
            if clause(form, "catch") && catch.is_none() && finally.is_empty() {
                let [_, _type, binding, handler @ ..] = items else {
                    return Err(CompileError::invalid(
                        "try",
                        form.pos,
                        "expected (catch type name body*)",
                    ));
                };
                let name = local_name(binding, "try")?;
                self.locals.push(name.clone());
                let handler = self.analyze_all(handler);
                self.locals.pop();
                catch = Some((munge(&name), handler?));
            } else if clause(form, "finally") && finally.is_empty() {
                finally = self.analyze_all(&items[1..])?;
            } else {
                return Err(CompileError::invalid(
                    "try",
                    form.pos,
                    "body forms must precede catch and finally clauses",
                ));
            }
        }
        Ok(Ast::new(
            Node::Try {
                body,
                catch,
                finally,
            },
            pos,
        ))
    }

    fn analyze_new(
        &mut self,
        args: &[Form],
        pos: Position,
    ) -> CompileResult<Ast> {
        let Some((ctor, ctor_args)) = args.split_first() else {
            return Err(CompileError::invalid("new", pos, "expected a constructor"));
        };
        Ok(Ast::new(
            Node::New {
                ctor: Box::new(self.analyze(ctor)?),
                args: self.analyze_all(ctor_args)?,
            },
            pos,
        ))
    }

    /// `(. target member args*)` or `(. target (member args*))`
    fn analyze_dot(
        &mut self,
        args: &[Form],
        pos: Position,
    ) -> CompileResult<Ast> {
        let [target, member, rest @ ..] = args else {
            return Err(CompileError::invalid(".", pos, "expected (. target member args*)"));
        };
        let (member, call_args): (&Form, &[Form]) = match member.as_list() {
            Some([head, inner @ ..]) if rest.is_empty() => (head, inner),
            _ => (member, rest),
        };
        let name = local_name(member, ".")?;
        let mut new_args = vec![target.clone()];
        new_args.extend_from_slice(call_args);
        self.analyze_member(&name, &new_args, pos)
    }

    /// `(.method target args*)` and `(.-field target)`
    fn analyze_member(
        &mut self,
        member: &str,
        args: &[Form],
        pos: Position,
    ) -> CompileResult<Ast> {
        let Some((target, call_args)) = args.split_first() else {
            return Err(CompileError::invalid(".", pos, "missing target"));
        };
        let target = Box::new(self.analyze(target)?);
        if let Some(field) = member.strip_prefix('-') {
            if field.is_empty() {
                return Err(CompileError::invalid(".", pos, "missing field name"));
            }
            if !call_args.is_empty() {
                return Err(CompileError::invalid(".", pos, "field access takes no arguments"));
            }
            return Ok(Ast::new(
                Node::Field {
                    target,
                    field: munge(field),
                },
                pos,
            ));
        }
        Ok(Ast::new(
            Node::Method {
                target,
                method: munge(member),
                args: self.analyze_all(call_args)?,
            },
            pos,
        ))
    }
}

/// Name of a binding position
fn local_name(
    form: &Form,
    special: &str,
) -> CompileResult<String> {
    form.as_symbol()
        .filter(|s| s.ns.is_none())
        .map(|s| s.name.clone())
        .ok_or_else(|| {
            CompileError::invalid(special, form.pos, format!("{} is not a valid binding", form))
        })
}

struct LibSpec {
    ns: String,
    alias: Option<String>,
    refers: Vec<String>,
}

/// Parse `foo.bar` or `[foo.bar :as b :refer [x y]]` (`:only` for `:use`)
fn parse_libspec(
    spec: &Form,
    clause: &str,
) -> CompileResult<LibSpec> {
    let spec = spec.unquote();
    let invalid = || {
        CompileError::invalid("ns", spec.pos, format!("invalid :{} spec {}", clause, spec))
    };
    match &spec.kind {
        FormKind::Symbol(sym) if sym.ns.is_none() => Ok(LibSpec {
            ns: sym.name.clone(),
            alias: None,
            refers: Vec::new(),
        }),
        FormKind::Vector(items) => {
            let Some((head, opts)) = items.split_first() else {
                return Err(invalid());
            };
            let ns = head.as_symbol().ok_or_else(invalid)?.to_string();
            let mut lib = LibSpec {
                ns,
                alias: None,
                refers: Vec::new(),
            };
            if opts.len() % 2 != 0 {
                return Err(invalid());
            }
            for pair in opts.chunks(2) {
                let key = pair[0].as_keyword().ok_or_else(invalid)?;
                match key.name.as_str() {
                    "as" => {
                        lib.alias = Some(pair[1].as_symbol().ok_or_else(invalid)?.name.clone());
                    }
                    "refer" | "only" => {
                        let names = pair[1].as_seq().ok_or_else(invalid)?;
                        for name in names {
                            lib.refers.push(name.as_symbol().ok_or_else(invalid)?.name.clone());
                        }
                    }
                    _ => return Err(invalid()),
                }
            }
            Ok(lib)
        }
        _ => Err(invalid()),
    }
}
