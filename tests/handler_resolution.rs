//! Handler resolution against real files on disk.
//!
//! Fixtures are written into a fresh temp directory per test; nothing here
//! mocks the engine or the filesystem.

use std::fs;
use std::path::Path;

use javelin::descriptor::HandlerDescriptor;
use javelin::engine::{InvokeOutcome, JsEngine};
use tempfile::TempDir;

fn write_module(root: &Path, rel: &str, source: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, source).unwrap();
}

fn load(root: &Path, handler: &str) -> javelin::Result<JsEngine> {
    let descriptor = HandlerDescriptor::parse(handler)?;
    let engine = JsEngine::new()?;
    engine.load_handler(root, &descriptor)?;
    Ok(engine)
}

fn invoke(engine: &JsEngine, payload: &str) -> InvokeOutcome {
    let context = serde_json::json!({ "awsRequestId": "req-t", "deadlineMs": 0 });
    engine.invoke(payload, &context).unwrap()
}

fn response_body(outcome: InvokeOutcome) -> String {
    match outcome {
        InvokeOutcome::Response(body) => body,
        InvokeOutcome::Failure(failure) => panic!("expected response, got {failure:?}"),
    }
}

#[test]
fn resolves_module_exports_assignment() {
    let dir = TempDir::new().unwrap();
    write_module(
        dir.path(),
        "index.js",
        "module.exports = { handler: (event) => event.x + 1 };",
    );
    let engine = load(dir.path(), "index.handler").unwrap();
    assert_eq!(response_body(invoke(&engine, r#"{"x": 1}"#)), "2");
}

#[test]
fn resolves_exports_shorthand() {
    let dir = TempDir::new().unwrap();
    write_module(dir.path(), "index.js", "exports.handler = () => \"short\";");
    let engine = load(dir.path(), "index.handler").unwrap();
    assert_eq!(response_body(invoke(&engine, "{}")), "\"short\"");
}

#[test]
fn resolves_file_without_extension() {
    let dir = TempDir::new().unwrap();
    write_module(dir.path(), "app", "module.exports.run = () => 1;");
    let engine = load(dir.path(), "app.run").unwrap();
    assert_eq!(response_body(invoke(&engine, "{}")), "1");
}

#[test]
fn resolves_under_module_root() {
    let dir = TempDir::new().unwrap();
    write_module(
        dir.path(),
        "src/nested/index.js",
        "module.exports.handler = () => \"deep\";",
    );
    let engine = load(dir.path(), "src/nested/index.handler").unwrap();
    assert_eq!(response_body(invoke(&engine, "{}")), "\"deep\"");
}

#[test]
fn resolves_nested_export_path() {
    let dir = TempDir::new().unwrap();
    write_module(
        dir.path(),
        "index.js",
        "module.exports = { api: { v1: { handler: () => \"v1\" } } };",
    );
    let engine = load(dir.path(), "index.api.v1.handler").unwrap();
    assert_eq!(response_body(invoke(&engine, "{}")), "\"v1\"");
}

#[test]
fn falls_back_to_node_modules() {
    let dir = TempDir::new().unwrap();
    write_module(
        dir.path(),
        "node_modules/lib/index.js",
        "module.exports.handler = () => \"from lib\";",
    );
    let engine = load(dir.path(), "lib.handler").unwrap();
    assert_eq!(response_body(invoke(&engine, "{}")), "\"from lib\"");
}

#[test]
fn missing_module_is_import_error() {
    let dir = TempDir::new().unwrap();
    let err = load(dir.path(), "ghost.handler").unwrap_err();
    assert_eq!(err.wire_type(), "Runtime.ImportModuleError");
    assert_eq!(err.to_string(), "Cannot find module 'ghost'");
}

#[test]
fn parent_traversal_never_touches_disk() {
    // The descriptor is rejected before resolution, so no fixture exists
    // and none is needed.
    let err = HandlerDescriptor::parse("../secrets.handler").unwrap_err();
    assert_eq!(err.wire_type(), "Runtime.MalformedHandlerName");
}

#[test]
fn broken_module_is_syntax_error() {
    let dir = TempDir::new().unwrap();
    write_module(dir.path(), "index.js", "module.exports.handler = function ( {");
    let err = load(dir.path(), "index.handler").unwrap_err();
    assert_eq!(err.wire_type(), "Runtime.UserCodeSyntaxError");
    assert!(err.to_string().starts_with("SyntaxError"));
}

#[test]
fn missing_export_is_handler_not_found() {
    let dir = TempDir::new().unwrap();
    write_module(dir.path(), "index.js", "module.exports.other = () => 0;");
    let err = load(dir.path(), "index.handler").unwrap_err();
    assert_eq!(err.wire_type(), "Runtime.HandlerNotFound");
    assert_eq!(
        err.to_string(),
        "index.handler is undefined or not exported"
    );
}

#[test]
fn non_function_export_is_handler_not_found() {
    let dir = TempDir::new().unwrap();
    write_module(dir.path(), "index.js", "module.exports.handler = 42;");
    let err = load(dir.path(), "index.handler").unwrap_err();
    assert_eq!(err.wire_type(), "Runtime.HandlerNotFound");
    assert_eq!(err.to_string(), "index.handler is not a function");
}

#[test]
fn not_found_messages_carry_the_directory_prefix() {
    let dir = TempDir::new().unwrap();
    write_module(
        dir.path(),
        "src/index.js",
        "module.exports = { other: () => 0, value: 42 };",
    );

    let err = load(dir.path(), "src/index.handler").unwrap_err();
    assert_eq!(
        err.to_string(),
        "src/index.handler is undefined or not exported"
    );

    let err = load(dir.path(), "src/index.value").unwrap_err();
    assert_eq!(err.to_string(), "src/index.value is not a function");
}

#[test]
fn nested_path_short_circuits_on_missing_intermediate() {
    let dir = TempDir::new().unwrap();
    write_module(dir.path(), "index.js", "module.exports = { api: {} };");
    let err = load(dir.path(), "index.api.v1.handler").unwrap_err();
    assert_eq!(err.wire_type(), "Runtime.HandlerNotFound");
    assert_eq!(
        err.to_string(),
        "index.api.v1.handler is undefined or not exported"
    );
}

#[test]
fn exact_file_wins_over_js_sibling() {
    let dir = TempDir::new().unwrap();
    write_module(dir.path(), "app", "module.exports.run = () => \"exact\";");
    write_module(dir.path(), "app.js", "module.exports.run = () => \"suffixed\";");
    let engine = load(dir.path(), "app.run").unwrap();
    assert_eq!(response_body(invoke(&engine, "{}")), "\"exact\"");
}
