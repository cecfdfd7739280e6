//! Inline source maps produced by the compiler, decoded again

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cljsrepl::compiler::{AnalysisEnv, Compiler, EmitOptions, JsCompiler, USER_NS};
use cljsrepl::reader::read_all;
use cljsrepl::source_map::{inline_map_comment, SourceMap, StackFrame, TraceMapper};
use cljsrepl::util::Position;

fn compile_with_map(text: &str) -> (String, String) {
    let form = read_all(text).unwrap().remove(0);
    let compiler = JsCompiler::new();
    let mut env = AnalysisEnv::new();
    let ast = compiler.analyze(&mut env, USER_NS, &form).unwrap();
    let emitted = compiler
        .emit(&ast, &EmitOptions { source_map: true })
        .unwrap();
    let comment = inline_map_comment(
        "repl-1.js",
        "repl-1.cljs",
        text,
        &emitted.mappings,
        form.pos.line as u32,
    )
    .unwrap();
    (emitted.js, comment)
}

fn decode_inline(comment: &str) -> SourceMap {
    let encoded = comment
        .split("base64,")
        .nth(1)
        .expect("inline map payload");
    let json = String::from_utf8(STANDARD.decode(encoded.trim()).unwrap()).unwrap();
    SourceMap::from_json(&json).unwrap()
}

#[test]
fn test_inline_map_points_back_to_form() {
    let (js, comment) = compile_with_map("\n\n  (inc 1)");
    assert!(comment.starts_with("\n//# sourceURL=repl-1.js\n"));

    let map = decode_inline(&comment);
    let arg_column = js.find(", 1)").unwrap() + 2;
    assert_eq!(
        map.map_position(Position::new(1, arg_column + 1)),
        Position::new(3, 8)
    );
}

#[test]
fn test_unmapped_lines_pass_through() {
    let (_js, comment) = compile_with_map("(inc 1)");
    let map = decode_inline(&comment);
    assert!(!map.has_line(40));
    assert_eq!(map.map_position(Position::new(40, 2)), Position::new(40, 2));
}

#[test]
fn test_trace_frames_use_co_located_source() {
    let out = tempfile::tempdir().unwrap();
    let app = out.path().join("app");
    std::fs::create_dir_all(&app).unwrap();
    std::fs::write(app.join("core.cljs"), "(ns app.core)\n\n(defn run [] (boom))\n").unwrap();
    std::fs::write(
        app.join("core.js.map"),
        r#"{"version":3,"file":"core.js","sources":["core.cljs"],"names":[],"mappings":";;AAEA"}"#,
    )
    .unwrap();

    let mut tracer = TraceMapper::new(out.path());
    let mapped = tracer.render_frame(&StackFrame {
        file: "app/core.js".to_string(),
        function: Some("app$core$run".to_string()),
        line: 3,
        column: 1,
    });
    assert!(mapped.starts_with("\tapp.core/run ("));
    assert!(mapped.ends_with("core.cljs:3:1)"));

    let raw = tracer.render_frame(&StackFrame {
        file: "vendor/lib.js".to_string(),
        function: None,
        line: 9,
        column: 4,
    });
    assert_eq!(raw, "\tvendor/lib.js:9:4");
}
