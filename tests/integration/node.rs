//! Node backend against a loopback server standing in for the runtime

use std::cell::RefCell;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::rc::Rc;
use std::thread::{self, JoinHandle};

use cljsrepl::backends::node::{NodeBackend, NodeOptions};
use cljsrepl::backends::{BackendError, EvalBackend, EvalResult};
use cljsrepl::build::JsLibrary;

use crate::support::sample_library;

/// Accept one connection and answer each request with the next reply
///
/// Returns every request received once the client hangs up.
fn fake_runtime(replies: Vec<&'static str>) -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        let mut requests = Vec::new();
        let mut replies = replies.into_iter();
        loop {
            let mut request = Vec::new();
            if reader.read_until(0, &mut request).unwrap() == 0 {
                return requests;
            }
            request.pop();
            requests.push(String::from_utf8(request).unwrap());
            match replies.next() {
                Some(reply) => writer.write_all(reply.as_bytes()).unwrap(),
                None => return requests,
            }
        }
    });
    (port, handle)
}

fn attach(port: u16) -> (tempfile::TempDir, NodeBackend<JsLibrary>) {
    let dir = sample_library();
    let library = JsLibrary::scan(dir.path()).unwrap();
    let options = NodeOptions {
        host: "127.0.0.1".to_string(),
        port,
        ..NodeOptions::default()
    };
    let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let backend = NodeBackend::attach(options, library, stream).unwrap();
    (dir, backend)
}

#[test]
fn test_evaluate_with_flushed_output() {
    let (port, server) = fake_runtime(vec![
        "hello\n\u{1}{\"status\":\"success\",\"value\":\"3\"}\0",
        "{\"status\":\"exception\",\"value\":\"Error: boom\\n    at x.js:1:1\"}\0",
    ]);
    let (_dir, backend) = attach(port);
    let flushed = Rc::new(RefCell::new(String::new()));
    let sink = Rc::clone(&flushed);
    let mut backend = backend.with_flush_sink(move |text| sink.borrow_mut().push_str(text));

    let result = backend.evaluate("<cljs repl>", 1, "1 + 2").unwrap();
    assert_eq!(result, EvalResult::success("3"));
    assert_eq!(flushed.borrow().as_str(), "hello\n");

    let result = backend.evaluate("<cljs repl>", 2, "throw new Error('boom')").unwrap();
    assert_eq!(result.value(), "Error: boom\n    at x.js:1:1");
    assert!(result.stacktrace().is_none());

    backend.tear_down().unwrap();
    let requests = server.join().unwrap();
    assert_eq!(requests, vec!["1 + 2", "throw new Error('boom')"]);
}

#[test]
fn test_load_requires_each_module_once() {
    let (port, server) = fake_runtime(vec![
        "{\"status\":\"success\",\"value\":null}\0",
        "{\"status\":\"exception\",\"value\":\"Error: missing\"}\0",
    ]);
    let (_dir, mut backend) = attach(port);
    let url = Path::new("app/core.js");

    backend.load(&["app.core".to_string()], url).unwrap();
    backend.load(&["app.core".to_string()], url).unwrap();

    let err = backend
        .load(&["app.broken".to_string()], Path::new("app/broken.js"))
        .unwrap_err();
    assert!(matches!(err, BackendError::LoadFailed { ref module, .. } if module == "app.broken"));
    assert!(!err.is_fatal());

    backend.tear_down().unwrap();
    let requests = server.join().unwrap();
    assert_eq!(
        requests,
        vec!["goog.require('app.core');", "goog.require('app.broken');"]
    );
}

#[test]
fn test_closed_connection_is_fatal() {
    let (port, server) = fake_runtime(Vec::new());
    let (_dir, mut backend) = attach(port);

    let err = backend.evaluate("<cljs repl>", 1, "1").unwrap_err();
    assert!(matches!(err, BackendError::ConnectionClosed));
    assert!(err.is_fatal());

    assert_eq!(server.join().unwrap(), vec!["1"]);
    backend.tear_down().unwrap();
    assert_eq!(backend.state_name(), "torn down");
}
