//! Evaluation pipeline
//!
//! Wrap, analyze, emit and send one top-level form to the backend.

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use super::{printer, Repl, ReplResult, REPL_FILENAME};
use crate::backends::{EvalBackend, EvalResult};
use crate::build::BuildGraph;
use crate::compiler::{Compiler, EmitOptions};
use crate::reader::{Form, Symbol};
use crate::source_map::inline_map_comment;

/// How a form is wrapped before evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapKind {
    /// Sent as is
    Identity,
    /// Printed without touching the result slots
    PrintOnly,
    /// Printed and recorded into `*1`/`*2`/`*3` or `*e`
    Record,
}

impl WrapKind {
    /// Wrapping used for a form typed at the prompt
    pub fn for_form(form: &Form) -> Self {
        if form.head_symbol().is_some_and(|s| s.is("ns")) {
            return WrapKind::Identity;
        }
        match form.as_symbol() {
            Some(sym) if sym.ns.is_none() && matches!(sym.name.as_str(), "*1" | "*2" | "*3" | "*e") => {
                WrapKind::PrintOnly
            }
            _ => WrapKind::Record,
        }
    }

    /// Apply the wrapping to `form`
    pub fn wrap(
        self,
        form: &Form,
    ) -> Form {
        let pos = form.pos;
        let sym = |name: &str| Form::symbol(name, pos);
        let list = |items: Vec<Form>| Form::list(items, pos);
        match self {
            WrapKind::Identity => form.clone(),
            WrapKind::PrintOnly => list(vec![sym("pr-str"), form.clone()]),
            WrapKind::Record => {
                let ret = "ret__auto__";
                let err = "e__auto__";
                let bind = Form::vector(vec![sym(ret), form.clone()], pos);
                let set = |target: &str, value: &str| list(vec![sym("set!"), sym(target), sym(value)]);
                list(vec![
                    sym("try"),
                    list(vec![
                        sym("let"),
                        bind,
                        set("*3", "*2"),
                        set("*2", "*1"),
                        set("*1", ret),
                        list(vec![sym("pr-str"), sym(ret)]),
                    ]),
                    list(vec![
                        sym("catch"),
                        Form::keyword(Symbol::new("default"), pos),
                        sym(err),
                        set("*e", err),
                        list(vec![sym("throw"), sym(err)]),
                    ]),
                ])
            }
        }
    }
}

/// A form that went through the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// The JavaScript that was sent
    pub js: String,
    pub result: EvalResult,
    pub wrap: WrapKind,
}

/// Stem shared by the generated script and its original source, `repl-<millis>`
fn repl_script_stem() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("repl-{}", millis)
}

impl<B: EvalBackend, C: Compiler, G: BuildGraph> Repl<B, C, G> {
    /// Compile `form` in the current namespace and evaluate it
    ///
    /// Dependencies of a namespace declaration are loaded before the
    /// declaration itself is sent. A successful declaration switches the
    /// current namespace.
    pub fn evaluate_form(
        &mut self,
        form: &Form,
        filename: &str,
        wrap: WrapKind,
        out: &mut dyn Write,
    ) -> ReplResult<Evaluation> {
        let wrapped = wrap.wrap(form);
        let ast = self
            .compiler
            .analyze(&mut self.env, self.session.current_ns(), &wrapped)?;

        let emitted = self.compiler.emit(
            &ast,
            &EmitOptions {
                source_map: self.options.source_map(),
            },
        )?;
        let mut js = emitted.js.clone();
        if self.options.source_map() {
            let stem = repl_script_stem();
            js.push_str(&inline_map_comment(
                &format!("{}.js", stem),
                &format!("{}.cljs", stem),
                &form.to_string(),
                &emitted.mappings,
                form.pos.line as u32,
            )?);
        }

        if self.options.verbose() {
            writeln!(out, "{}", js)?;
        }

        if let Some(decl) = ast.ns_decl() {
            self.load_dependencies(&decl.runtime_deps())?;
        }

        debug!("Sending {} bytes from {}", js.len(), filename);
        let result = self
            .backend
            .evaluate(filename, form.pos.line as u32, &js)?;

        if result.is_success() {
            if let Some(decl) = ast.ns_decl() {
                self.session.set_current_ns(decl.name.clone());
            }
        }

        Ok(Evaluation { js, result, wrap })
    }

    /// Evaluate a form typed at the prompt and print the outcome
    pub fn eval_and_print(
        &mut self,
        form: &Form,
        out: &mut dyn Write,
    ) -> ReplResult<()> {
        let wrap = WrapKind::for_form(form);
        let evaluation = self.evaluate_form(form, REPL_FILENAME, wrap, out)?;
        let recorded = wrap == WrapKind::Record;
        match &evaluation.result {
            EvalResult::Success { value } => {
                writeln!(out, "{}", value)?;
                if recorded {
                    self.session.record_success(value.clone());
                }
            }
            failed => {
                if recorded {
                    self.session.record_failure(failed.value());
                }
                self.display_failure(form, &evaluation, out)?;
            }
        }
        Ok(())
    }

    /// Print a failed evaluation with its trace
    pub(crate) fn display_failure(
        &mut self,
        form: &Form,
        evaluation: &Evaluation,
        out: &mut dyn Write,
    ) -> ReplResult<()> {
        let result = &evaluation.result;
        printer::print_error(out, result.value(), self.options.colors())?;

        if let Some(raw) = result.stacktrace() {
            let parser = self.backend.stacktrace_parser();
            match parser {
                Some(parser) if self.options.source_map() => {
                    let frames = parser.parse_stacktrace(raw, result, &self.options);
                    self.tracer.print_mapped_trace(&frames, out)?;
                }
                _ => writeln!(out, "{}", raw)?,
            }
        }

        if self.options.verbose() && matches!(result, EvalResult::Exception { .. }) {
            writeln!(out, "Error evaluating: {} :as {:?}", form, evaluation.js)?;
        }
        Ok(())
    }
}
