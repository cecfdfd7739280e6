//! Shared fixtures: a scripted backend and an on-disk library

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use cljsrepl::backends::{BackendResult, EvalBackend, EvalResult, StacktraceParser};
use cljsrepl::repl::ReplOptions;
use cljsrepl::source_map::StackFrame;
use tempfile::TempDir;

/// Everything the fake backend was asked to do
#[derive(Debug, Default)]
pub struct CallLog {
    pub setups: usize,
    pub tear_downs: usize,
    pub evaluated: Vec<String>,
    pub loads: Vec<Vec<String>>,
}

type Responder = Box<dyn FnMut(&str) -> BackendResult<EvalResult>>;

/// Parses V8 frames of the form `at fn (file:line:column)` or `at file:line:column`
pub struct V8TraceParser;

fn parse_location(location: &str) -> Option<(String, u32, u32)> {
    let mut parts = location.rsplitn(3, ':');
    let column = parts.next()?.parse().ok()?;
    let line = parts.next()?.parse().ok()?;
    Some((parts.next()?.to_string(), line, column))
}

impl StacktraceParser for V8TraceParser {
    fn parse_stacktrace(
        &self,
        raw: &str,
        _result: &EvalResult,
        _options: &ReplOptions,
    ) -> Vec<StackFrame> {
        raw.lines()
            .filter_map(|line| line.trim().strip_prefix("at "))
            .filter_map(|frame| {
                let (function, location) = match frame.split_once(" (") {
                    Some((f, rest)) => (Some(f.to_string()), rest.trim_end_matches(')')),
                    None => (None, frame),
                };
                let (file, line, column) = parse_location(location)?;
                Some(StackFrame {
                    file,
                    function,
                    line,
                    column,
                })
            })
            .collect()
    }
}

/// Backend answering from a closure; loader bootstrap code always succeeds
pub struct FakeBackend {
    log: Rc<RefCell<CallLog>>,
    responder: Responder,
    parser: Option<V8TraceParser>,
}

impl FakeBackend {
    pub fn new(responder: impl FnMut(&str) -> BackendResult<EvalResult> + 'static) -> (Self, Rc<RefCell<CallLog>>) {
        let log = Rc::new(RefCell::new(CallLog::default()));
        let backend = Self {
            log: Rc::clone(&log),
            responder: Box::new(responder),
            parser: None,
        };
        (backend, log)
    }

    /// Also offer stack trace parsing
    pub fn with_trace_parser(mut self) -> Self {
        self.parser = Some(V8TraceParser);
        self
    }

    /// Backend that answers `nil` to everything
    pub fn quiet() -> (Self, Rc<RefCell<CallLog>>) {
        Self::new(|_| Ok(EvalResult::success("nil")))
    }
}

impl EvalBackend for FakeBackend {
    fn setup(
        &mut self,
        _options: &ReplOptions,
    ) -> BackendResult<()> {
        self.log.borrow_mut().setups += 1;
        Ok(())
    }

    fn evaluate(
        &mut self,
        _filename: &str,
        _line: u32,
        code: &str,
    ) -> BackendResult<EvalResult> {
        self.log.borrow_mut().evaluated.push(code.to_string());
        if code.starts_with("goog.") {
            return Ok(EvalResult::success("nil"));
        }
        (self.responder)(code)
    }

    fn load(
        &mut self,
        provides: &[String],
        _url: &Path,
    ) -> BackendResult<()> {
        self.log.borrow_mut().loads.push(provides.to_vec());
        Ok(())
    }

    fn tear_down(&mut self) -> BackendResult<()> {
        self.log.borrow_mut().tear_downs += 1;
        Ok(())
    }

    fn stacktrace_parser(&self) -> Option<&dyn StacktraceParser> {
        self.parser.as_ref().map(|p| p as &dyn StacktraceParser)
    }
}

/// Options for deterministic output
pub fn plain_options() -> ReplOptions {
    ReplOptions {
        colors: Some(false),
        ..ReplOptions::default()
    }
}

fn write(
    root: &Path,
    rel: &str,
    text: &str,
) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

/// A library with the base runtime, core and two application units
///
/// `app.core` requires `app.util`; both require `cljs.core`.
pub fn sample_library() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "goog/base.js", "var goog = goog || {};\n");
    write(root, "cljs/core.js", "goog.provide('cljs.core');\n");
    write(
        root,
        "app/util.js",
        "goog.provide('app.util');\ngoog.require('cljs.core');\n",
    );
    write(
        root,
        "app/core.js",
        "goog.provide('app.core');\ngoog.require('cljs.core');\ngoog.require('app.util');\n",
    );
    write(root, "app/core.cljs", "(ns app.core (:require app.util))\n");
    dir
}

/// A compiled `app.core` unit whose line 3 maps back to line 3 of its source
pub fn mapped_output_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "app/core.cljs", "(ns app.core)\n\n(defn run [] (boom))\n");
    write(
        dir.path(),
        "app/core.js.map",
        r#"{"version":3,"file":"core.js","sources":["core.cljs"],"names":[],"mappings":";;AAEA"}"#,
    );
    dir
}

/// Write a source file for `load-file`
pub fn source_file(
    dir: &Path,
    name: &str,
    text: &str,
) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}
