//! Dependency loading against an on-disk library

use std::io::Cursor;

use cljsrepl::build::JsLibrary;
use cljsrepl::compiler::JsCompiler;
use cljsrepl::reader::BufReadSource;
use cljsrepl::repl::{Repl, ReplError};

use crate::support::{plain_options, sample_library, FakeBackend};

#[test]
fn test_streaming_mode_loads_once() {
    let dir = sample_library();
    let library = JsLibrary::scan(dir.path()).unwrap();
    let (backend, log) = FakeBackend::quiet();
    let mut repl = Repl::new(backend, JsCompiler::new(), library, plain_options());

    assert_eq!(repl.load_namespace("app.core").unwrap(), 2);
    assert_eq!(
        log.borrow().loads,
        vec![vec!["app.util".to_string()], vec!["app.core".to_string()]]
    );
    assert!(repl.is_loaded("app.util"));

    assert_eq!(repl.load_namespace("app.core").unwrap(), 0);
    assert_eq!(repl.load_namespace("app.util").unwrap(), 0);
    assert_eq!(log.borrow().loads.len(), 2);
}

#[test]
fn test_directory_mode_registers_dependencies() {
    let dir = sample_library();
    let out_dir = tempfile::tempdir().unwrap();
    let library = JsLibrary::scan(dir.path()).unwrap();
    let (backend, log) = FakeBackend::quiet();
    let mut options = plain_options();
    options.output_dir = Some(out_dir.path().to_path_buf());
    let mut repl = Repl::new(backend, JsCompiler::new(), library, options);

    let delivered = repl
        .load_dependencies(&["app.core".to_string(), "app.core".to_string()])
        .unwrap();
    assert_eq!(delivered, 2);

    assert!(out_dir.path().join("app/util.js").is_file());
    assert!(out_dir.path().join("app/core.js").is_file());
    assert!(out_dir.path().join("app/core.cljs").is_file());

    let log = log.borrow();
    assert!(log.loads.is_empty());
    assert_eq!(
        log.evaluated,
        vec![
            "goog.addDependency(\"../app/util.js\", ['app.util'], ['cljs.core']);".to_string(),
            "goog.addDependency(\"../app/core.js\", ['app.core'], ['cljs.core', 'app.util']);"
                .to_string(),
        ]
    );
}

#[test]
fn test_unknown_namespace_is_reported() {
    let dir = sample_library();
    let library = JsLibrary::scan(dir.path()).unwrap();
    let (backend, _log) = FakeBackend::quiet();
    let mut repl = Repl::new(backend, JsCompiler::new(), library, plain_options());

    let err = repl.load_namespace("no.such.ns").unwrap_err();
    assert!(matches!(err, ReplError::Build(_)));
    assert!(!err.is_fatal());
}

#[test]
fn test_require_loads_before_namespace_form() {
    let dir = sample_library();
    let library = JsLibrary::scan(dir.path()).unwrap();
    let (backend, log) = FakeBackend::quiet();
    let mut repl = Repl::new(backend, JsCompiler::new(), library, plain_options());

    let input = BufReadSource::new(Cursor::new(
        "(require '[app.core :as c])\n(require 'app.core)\n(c/run)\n".to_string(),
    ));
    let mut out = Vec::new();
    repl.run_session(input, &mut out).unwrap();

    let log = log.borrow();
    assert_eq!(log.loads.len(), 2);
    assert_eq!(repl.session().current_ns(), "cljs.user");
    assert!(log
        .evaluated
        .iter()
        .any(|code| code.contains("app.core.run.call(null)")));
}
