//! Driver scenarios over a scripted backend

use std::io::Cursor;

use cljsrepl::backends::{BackendError, EvalResult};
use cljsrepl::build::JsLibrary;
use cljsrepl::compiler::JsCompiler;
use cljsrepl::reader::BufReadSource;
use cljsrepl::repl::{run_session, Repl, ReplError, SessionExit};

use crate::support::{mapped_output_dir, plain_options, sample_library, source_file, FakeBackend};

fn input(text: &str) -> BufReadSource<Cursor<String>> {
    BufReadSource::new(Cursor::new(text.to_string()))
}

fn library() -> (tempfile::TempDir, JsLibrary) {
    let dir = sample_library();
    let library = JsLibrary::scan(dir.path()).unwrap();
    (dir, library)
}

#[test]
fn test_addition_then_quit() {
    let (_dir, library) = library();
    let (backend, log) = FakeBackend::new(|code| {
        assert!(code.contains("cljs.core._PLUS_.call(null, 1, 2)"));
        Ok(EvalResult::success("3"))
    });

    let mut out = Vec::new();
    let exit = run_session(
        backend,
        JsCompiler::new(),
        library,
        plain_options(),
        input("(+ 1 2)\n:cljs/quit\n"),
        &mut out,
    )
    .unwrap();

    assert_eq!(exit, SessionExit::Quit);
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text, "To quit, type: :cljs/quit\n3\n");
    let log = log.borrow();
    assert_eq!(log.setups, 1);
    assert_eq!(log.tear_downs, 1);
    assert!(log.evaluated[0].starts_with("goog.provide('cljs.user');"));
}

#[test]
fn test_unbound_result_slot_keeps_namespace() {
    let (_dir, library) = library();
    let (backend, log) = FakeBackend::new(|code| {
        if code.contains("cljs.core._STAR_1") && code.contains("_PLUS_") {
            Ok(EvalResult::exception("Error: *1 is unbound", None))
        } else {
            Ok(EvalResult::success("nil"))
        }
    });

    let mut repl = Repl::new(backend, JsCompiler::new(), library, plain_options());
    let mut out = Vec::new();
    let exit = repl
        .run_session(input("(in-ns 'foo.bar)\n(+ *1 1)\n"), &mut out)
        .unwrap();

    assert_eq!(exit, SessionExit::EndOfInput);
    assert_eq!(repl.session().current_ns(), "foo.bar");
    assert_eq!(repl.prompt(), "foo.bar=> ");
    assert_eq!(repl.session().last_error(), Some("Error: *1 is unbound"));
    assert_eq!(repl.session().last_value(1), None);

    let text = String::from_utf8(out).unwrap();
    assert!(text.ends_with("Error: *1 is unbound\n"));
    assert!(log
        .borrow()
        .evaluated
        .iter()
        .any(|code| code == "goog.provide('foo.bar');"));
}

#[test]
fn test_exception_prints_raw_trace() {
    let (_dir, library) = library();
    let (backend, _log) = FakeBackend::new(|_| {
        Ok(EvalResult::exception(
            "boom",
            Some("Error: boom\n    at repl-1.js:1:7".to_string()),
        ))
    });

    let mut out = Vec::new();
    run_session(
        backend,
        JsCompiler::new(),
        library,
        plain_options(),
        input("(throw (js/Error. \"boom\"))\n"),
        &mut out,
    )
    .unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(text.ends_with("boom\nError: boom\n    at repl-1.js:1:7\n"));
}

#[test]
fn test_source_mapped_trace_replaces_raw_trace() {
    let (_dir, library) = library();
    let out_dir = mapped_output_dir();
    let (backend, log) = FakeBackend::new(|code| {
        if code.contains("sourceMappingURL") {
            Ok(EvalResult::exception(
                "boom",
                Some("Error: boom\n    at app$core$run (app/core.js:3:1)".to_string()),
            ))
        } else {
            Ok(EvalResult::success("nil"))
        }
    });
    let mut options = plain_options();
    options.source_map = Some(true);
    options.output_dir = Some(out_dir.path().to_path_buf());

    let mut out = Vec::new();
    run_session(
        backend.with_trace_parser(),
        JsCompiler::new(),
        library,
        options,
        input("(throw (js/Error. \"boom\"))\n"),
        &mut out,
    )
    .unwrap();

    let log = log.borrow();
    let sent = log.evaluated.last().unwrap();
    assert!(sent.contains("\n//# sourceURL=repl-"));
    assert!(sent.contains("sourceMappingURL=data:application/json;base64,"));

    let text = String::from_utf8(out).unwrap();
    let mapped = text
        .lines()
        .find(|line| line.starts_with("\tapp.core/run ("))
        .expect("mapped frame");
    assert!(mapped.ends_with("core.cljs:3:1)"));
    assert!(text.contains("boom\n"));
    assert!(!text.contains("app$core$run"));
    assert!(!text.contains("app/core.js:3:1"));
}

#[test]
fn test_results_rotate_through_slots() {
    let (_dir, library) = library();
    let mut counter = 0;
    let (backend, _log) = FakeBackend::new(move |_| {
        counter += 1;
        Ok(EvalResult::success(counter.to_string()))
    });

    let mut repl = Repl::new(backend, JsCompiler::new(), library, plain_options());
    let mut out = Vec::new();
    repl.run_session(input("(inc 0)\n(inc 1)\n*1\n(inc 2)\n"), &mut out)
        .unwrap();

    // `*1` is printed but not recorded
    assert_eq!(repl.session().last_value(1), Some("4"));
    assert_eq!(repl.session().last_value(2), Some("2"));
    assert_eq!(repl.session().last_value(3), Some("1"));
}

#[test]
fn test_read_error_does_not_end_session() {
    let (_dir, library) = library();
    let (backend, _log) = FakeBackend::new(|_| Ok(EvalResult::success("7")));

    let mut out = Vec::new();
    let exit = run_session(
        backend,
        JsCompiler::new(),
        library,
        plain_options(),
        input(")\n(+ 3 4)\n"),
        &mut out,
    )
    .unwrap();

    assert_eq!(exit, SessionExit::EndOfInput);
    let text = String::from_utf8(out).unwrap();
    assert!(text.ends_with("7\n"));
}

#[test]
fn test_special_form_failure_continues() {
    let (_dir, library) = library();
    let (backend, _log) = FakeBackend::new(|_| Ok(EvalResult::success("1")));

    let mut out = Vec::new();
    let exit = run_session(
        backend,
        JsCompiler::new(),
        library,
        plain_options(),
        input("(load-file \"does/not/exist.cljs\")\n(inc 0)\n:cljs/quit\n"),
        &mut out,
    )
    .unwrap();

    assert_eq!(exit, SessionExit::Quit);
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("File not found: does/not/exist.cljs\n"));
    assert!(text.ends_with("1\n"));
}

#[test]
fn test_fatal_backend_error_ends_session() {
    let (_dir, library) = library();
    let (backend, log) = FakeBackend::new(|_| Err(BackendError::ConnectionClosed));

    let mut out = Vec::new();
    let err = run_session(
        backend,
        JsCompiler::new(),
        library,
        plain_options(),
        input("(+ 1 2)\n(+ 3 4)\n"),
        &mut out,
    )
    .unwrap_err();

    assert!(matches!(err, ReplError::Backend(BackendError::ConnectionClosed)));
    let log = log.borrow();
    assert_eq!(log.tear_downs, 1);
    // The second form is never sent
    assert_eq!(log.evaluated.len(), 2);
}

#[test]
fn test_load_file_restores_namespace() {
    let (dir, library) = library();
    let file = source_file(
        dir.path(),
        "scratch.cljs",
        "(ns scratch.core)\n(def answer 42)\n",
    );
    let (backend, log) = FakeBackend::quiet();

    let mut repl = Repl::new(backend, JsCompiler::new(), library, plain_options());
    let mut out = Vec::new();
    let text = format!("(load-file {:?})\n", file.display().to_string());
    repl.run_session(input(&text), &mut out).unwrap();

    assert_eq!(repl.session().current_ns(), "cljs.user");
    assert!(repl.env().contains("scratch.core"));
    let log = log.borrow();
    assert!(log
        .evaluated
        .iter()
        .any(|code| code.contains("scratch.core.answer = 42")));
}

#[test]
fn test_verbose_prints_generated_code() {
    let (_dir, library) = library();
    let (backend, _log) = FakeBackend::new(|_| Ok(EvalResult::exception("bad", None)));
    let mut options = plain_options();
    options.verbose = Some(true);

    let mut out = Vec::new();
    run_session(
        backend,
        JsCompiler::new(),
        library,
        options,
        input("(f)\n"),
        &mut out,
    )
    .unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("cljs.user.f.call(null)") || text.contains("cljs.core.f.call(null)"));
    assert!(text.contains("Error evaluating: (f) :as \""));
}
