//! Built-in special forms
//!
//! Handled by the driver itself instead of going through the compiler.
//! Each handler receives the whole form, head symbol included.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use tracing::debug;

use super::{Repl, ReplError, ReplResult, WrapKind};
use crate::backends::EvalBackend;
use crate::build::BuildGraph;
use crate::compiler::{munge_ns, Compiler};
use crate::reader::{read_all, Form, Symbol};

/// Handler for one special form
pub type SpecialFn<B, C, G> = fn(&mut Repl<B, C, G>, &Form, &mut dyn Write) -> ReplResult<()>;

/// The built-in handlers, keyed by head symbol
pub fn builtins<B, C, G>() -> HashMap<&'static str, SpecialFn<B, C, G>>
where
    B: EvalBackend,
    C: Compiler,
    G: BuildGraph,
{
    let mut fns: HashMap<&'static str, SpecialFn<B, C, G>> = HashMap::new();
    fns.insert("in-ns", in_ns);
    fns.insert("require", require);
    fns.insert("require-macros", require_macros);
    fns.insert("load-file", load_file);
    fns.insert("load-namespace", load_namespace);
    fns
}

fn invalid(
    name: &str,
    message: impl Into<String>,
) -> ReplError {
    ReplError::InvalidSpecialForm {
        name: name.to_string(),
        message: message.into(),
    }
}

/// Arguments after the head symbol
fn args(form: &Form) -> &[Form] {
    form.as_list().and_then(|items| items.get(1..)).unwrap_or_default()
}

/// The single quoted, unqualified symbol argument of `form`
fn namespace_arg<'f>(
    name: &str,
    form: &'f Form,
) -> ReplResult<&'f str> {
    match args(form) {
        [arg] => match arg.unquote().as_symbol() {
            Some(Symbol { ns: None, name: ns }) => Ok(ns.as_str()),
            _ => Err(invalid(name, "expected a quoted namespace symbol")),
        },
        _ => Err(invalid(name, "expected exactly one argument")),
    }
}

fn in_ns<B, C, G>(
    repl: &mut Repl<B, C, G>,
    form: &Form,
    _out: &mut dyn Write,
) -> ReplResult<()>
where
    B: EvalBackend,
    C: Compiler,
    G: BuildGraph,
{
    let ns = namespace_arg("in-ns", form)?;
    if repl.env.register(ns) {
        let code = format!("goog.provide('{}');", munge_ns(ns));
        let result = repl.backend.evaluate(super::REPL_FILENAME, form.pos.line as u32, &code)?;
        if !result.is_success() {
            return Err(ReplError::EvaluationFailed(result.value().to_string()));
        }
    }
    repl.session.set_current_ns(ns);
    Ok(())
}

/// Rewrite `(<head> specs...)` as `(ns <current> (<clause> specs...))` and evaluate it
fn require_with<B, C, G>(
    repl: &mut Repl<B, C, G>,
    form: &Form,
    clause: &str,
    out: &mut dyn Write,
) -> ReplResult<()>
where
    B: EvalBackend,
    C: Compiler,
    G: BuildGraph,
{
    let specs = args(form);
    if specs.is_empty() {
        return Err(invalid(clause.trim_start_matches(':'), "expected at least one libspec"));
    }

    let pos = form.pos;
    let mut clause_items = vec![Form::keyword(Symbol::new(clause.trim_start_matches(':')), pos)];
    clause_items.extend(specs.iter().map(|spec| spec.unquote().clone()));
    let decl = Form::list(
        vec![
            Form::symbol("ns", pos),
            Form::symbol(repl.session.current_ns(), pos),
            Form::list(clause_items, pos),
        ],
        pos,
    );

    let evaluation = repl.evaluate_form(&decl, super::REPL_FILENAME, WrapKind::Identity, out)?;
    if !evaluation.result.is_success() {
        repl.display_failure(&decl, &evaluation, out)?;
    }
    Ok(())
}

fn require<B, C, G>(
    repl: &mut Repl<B, C, G>,
    form: &Form,
    out: &mut dyn Write,
) -> ReplResult<()>
where
    B: EvalBackend,
    C: Compiler,
    G: BuildGraph,
{
    require_with(repl, form, ":require", out)
}

fn require_macros<B, C, G>(
    repl: &mut Repl<B, C, G>,
    form: &Form,
    out: &mut dyn Write,
) -> ReplResult<()>
where
    B: EvalBackend,
    C: Compiler,
    G: BuildGraph,
{
    require_with(repl, form, ":require-macros", out)
}

fn load_file<B, C, G>(
    repl: &mut Repl<B, C, G>,
    form: &Form,
    out: &mut dyn Write,
) -> ReplResult<()>
where
    B: EvalBackend,
    C: Compiler,
    G: BuildGraph,
{
    let path = match args(form) {
        [arg] => arg
            .as_str()
            .map(PathBuf::from)
            .ok_or_else(|| invalid("load-file", "expected a file name string"))?,
        _ => return Err(invalid("load-file", "expected exactly one argument")),
    };
    if !path.is_file() {
        return Err(ReplError::MissingSourceFile(path));
    }

    let text = fs::read_to_string(&path).map_err(|source| ReplError::SourceFile {
        path: path.clone(),
        source,
    })?;
    let forms = read_all(&text)?;
    let filename = path.display().to_string();
    debug!("Loading {} form(s) from {}", forms.len(), filename);

    // A file usually starts with its own ns form; the prompt keeps its namespace.
    let saved_ns = repl.session.current_ns().to_string();
    let mut outcome = Ok(());
    for file_form in &forms {
        match repl.evaluate_form(file_form, &filename, WrapKind::Identity, out) {
            Ok(evaluation) if evaluation.result.is_success() => {}
            Ok(evaluation) => {
                outcome = repl.display_failure(file_form, &evaluation, out);
                break;
            }
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }
    repl.session.set_current_ns(saved_ns);
    outcome
}

fn load_namespace<B, C, G>(
    repl: &mut Repl<B, C, G>,
    form: &Form,
    _out: &mut dyn Write,
) -> ReplResult<()>
where
    B: EvalBackend,
    C: Compiler,
    G: BuildGraph,
{
    let ns = namespace_arg("load-namespace", form)?;
    repl.load_namespace(ns)?;
    Ok(())
}
