//! Embedded QuickJS engine hosting the user handler.
//!
//! The engine owns a single runtime and context for the life of the process.
//! Handler modules are CommonJS files evaluated under a small shim, the
//! resolved function is pinned in an engine global, and each invocation runs
//! through an installed glue function that funnels the three completion
//! signals (returned promise, Node-style callback, synchronous return) into
//! one first-writer-wins settlement slot. Rust only ever evaluates, reads
//! globals, and drains pending jobs; no JS value outlives a context lock.

use std::path::{Path, PathBuf};

use rquickjs::convert::Coerced;
use rquickjs::function::{Func, Rest};
use rquickjs::{Context, Ctx, FromJs, Function, Object, Runtime, Type, Value};

use crate::descriptor::HandlerDescriptor;
use crate::error::{Error, Result};
use crate::report::FailureValue;

/// Nesting allowed when projecting a thrown object's properties to JSON.
/// Beyond this the capture keeps name/message/stack and drops the rest.
const MAX_PROPERTY_DEPTH: usize = 8;

/// Outcome of one handler invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum InvokeOutcome {
    /// JSON-encoded response body, ready to post verbatim.
    Response(String),
    /// Captured failure, ready for normalization.
    Failure(FailureValue),
}

pub struct JsEngine {
    runtime: Runtime,
    context: Context,
}

impl std::fmt::Debug for JsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsEngine").finish_non_exhaustive()
    }
}

impl JsEngine {
    pub fn new() -> Result<Self> {
        let runtime = Runtime::new().map_err(|err| map_engine_error(&err))?;
        let context = Context::full(&runtime).map_err(|err| map_engine_error(&err))?;
        let engine = Self { runtime, context };
        engine.install()?;
        Ok(engine)
    }

    fn install(&self) -> Result<()> {
        self.context
            .with(|ctx| {
                install_console(&ctx)?;
                ctx.eval::<(), _>(HARNESS_JS)
            })
            .map_err(|err| map_engine_error(&err))
    }

    /// Load the handler module and pin the resolved function.
    ///
    /// Runs once at init. Resolution order for the module file mirrors a
    /// CommonJS require of a bare name: the exact file, the file with `.js`
    /// appended, then `node_modules` under the module root and the task
    /// root.
    pub fn load_handler(&self, task_root: &Path, descriptor: &HandlerDescriptor) -> Result<()> {
        let file = resolve_module_file(task_root, descriptor).ok_or_else(|| {
            Error::import_module(format!("Cannot find module '{}'", descriptor.module_name))
        })?;
        tracing::debug!(
            event = "engine.load",
            module = %file.display(),
            function = %descriptor.function_name(),
            "Loading handler module"
        );

        self.context.with(|ctx| -> Result<()> {
            ctx.eval::<(), _>(COMMONJS_SHIM)
                .map_err(|err| map_engine_error(&err))?;
            ctx.eval_file::<(), _>(&file)
                .map_err(|err| classify_load_error(&ctx, err, descriptor))?;

            let module: Object = ctx
                .globals()
                .get("module")
                .map_err(|err| map_engine_error(&err))?;
            let exports: Value = module.get("exports").map_err(|err| map_engine_error(&err))?;

            let handler =
                walk_function_path(&exports, descriptor).map_err(|err| map_engine_error(&err))?;
            let handler = handler.ok_or_else(|| {
                Error::handler_not_found(format!(
                    "{} is undefined or not exported",
                    descriptor.full_name()
                ))
            })?;
            if !handler.is_function() {
                return Err(Error::handler_not_found(format!(
                    "{} is not a function",
                    descriptor.full_name()
                )));
            }

            ctx.globals()
                .set("__handler", handler)
                .map_err(|err| map_engine_error(&err))?;
            Ok(())
        })
    }

    /// Run one invocation through the pinned handler.
    ///
    /// Total over handler behavior: user-code failures of any shape come
    /// back as [`InvokeOutcome::Failure`], never as `Err`. `Err` is reserved
    /// for the engine itself breaking.
    pub fn invoke(&self, payload: &str, context_object: &serde_json::Value) -> Result<InvokeOutcome> {
        let started = self.context.with(|ctx| -> Result<Option<FailureValue>> {
            let event = match ctx.json_parse(payload.as_bytes().to_vec()) {
                Ok(value) => value,
                Err(err) => return Ok(Some(failure_from_caught(&ctx, err))),
            };
            let js_context =
                json_to_js(&ctx, context_object).map_err(|err| map_engine_error(&err))?;
            let invoke_fn: Function = ctx
                .globals()
                .get("__invoke")
                .map_err(|err| map_engine_error(&err))?;
            match invoke_fn.call::<_, ()>((event, js_context)) {
                Ok(()) => Ok(None),
                Err(err) => Ok(Some(failure_from_caught(&ctx, err))),
            }
        })?;
        if let Some(failure) = started {
            return Ok(InvokeOutcome::Failure(failure));
        }

        self.drain_jobs();

        self.context.with(|ctx| -> Result<InvokeOutcome> {
            let pending: Object = ctx
                .globals()
                .get("__pending")
                .map_err(|err| map_engine_error(&err))?;
            let state: String = pending.get("state").map_err(|err| map_engine_error(&err))?;
            let value: Value = pending.get("value").map_err(|err| map_engine_error(&err))?;

            match state.as_str() {
                "fulfilled" => Ok(encode_response(&ctx, value)),
                "rejected" => Ok(InvokeOutcome::Failure(capture_failure(&ctx, value))),
                _ => {
                    // Job queue is empty and nothing settled the slot; with no
                    // timers or IO inside the engine it never will.
                    let err = Error::HandlerDidNotSettle(
                        "handler finished without returning a promise, calling the callback, \
                         or returning a value"
                            .to_owned(),
                    );
                    Ok(InvokeOutcome::Failure(FailureValue::from(&err)))
                }
            }
        })
    }

    /// Drain the job queue to a fixpoint. A job that raises is logged and
    /// counts as progress; rejection reaches the settlement slot through the
    /// glue, not through this loop.
    fn drain_jobs(&self) {
        loop {
            match self.runtime.execute_pending_job() {
                Ok(true) => {}
                Ok(false) => break,
                Err(_) => {
                    tracing::warn!(event = "engine.job_raised", "Pending job raised an exception");
                }
            }
        }
    }
}

// ============================================================================
// Module resolution
// ============================================================================

fn resolve_module_file(task_root: &Path, descriptor: &HandlerDescriptor) -> Option<PathBuf> {
    let root = task_root.join(&descriptor.module_root);
    let name = &descriptor.module_name;
    let candidates = [
        root.join(name),
        root.join(format!("{name}.js")),
        root.join("node_modules").join(format!("{name}.js")),
        root.join("node_modules").join(name).join("index.js"),
        task_root.join("node_modules").join(format!("{name}.js")),
        task_root.join("node_modules").join(name).join("index.js"),
    ];
    candidates.into_iter().find(|path| path.is_file())
}

fn classify_load_error(ctx: &Ctx<'_>, err: rquickjs::Error, descriptor: &HandlerDescriptor) -> Error {
    if !matches!(err, rquickjs::Error::Exception) {
        return map_engine_error(&err);
    }
    let thrown = ctx.catch();
    let (name, message) = exception_name_message(&thrown);
    if name == "SyntaxError" {
        Error::user_code_syntax(format!("SyntaxError: {message}"))
    } else {
        Error::engine(format!(
            "module '{}' threw during initialization: {name}: {message}",
            descriptor.module_name
        ))
    }
}

fn exception_name_message(thrown: &Value<'_>) -> (String, String) {
    let Some(obj) = thrown.as_object() else {
        return ("Error".to_owned(), String::new());
    };
    let name = obj
        .get::<_, Coerced<String>>("name")
        .map(|c| c.0)
        .unwrap_or_else(|_| "Error".to_owned());
    let message = obj
        .get::<_, Coerced<String>>("message")
        .map(|c| c.0)
        .unwrap_or_default();
    (name, message)
}

fn walk_function_path<'js>(
    exports: &Value<'js>,
    descriptor: &HandlerDescriptor,
) -> rquickjs::Result<Option<Value<'js>>> {
    let mut current = exports.clone();
    for segment in &descriptor.function_path {
        let Some(obj) = current.as_object() else {
            return Ok(None);
        };
        let next: Value = obj.get(segment.as_str())?;
        if next.is_undefined() || next.is_null() {
            return Ok(None);
        }
        current = next;
    }
    Ok(Some(current))
}

// ============================================================================
// Response encoding and failure capture
// ============================================================================

fn encode_response<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> InvokeOutcome {
    match ctx.json_stringify(value) {
        Ok(Some(body)) => match body.to_string() {
            Ok(body) => InvokeOutcome::Response(body),
            Err(_) => InvokeOutcome::Failure(FailureValue::simple(
                "Runtime.SerializationError",
                "Unable to stringify response body",
            )),
        },
        // undefined stringifies to nothing; the wire form is null.
        Ok(None) => InvokeOutcome::Response("null".to_owned()),
        Err(_) => InvokeOutcome::Failure(FailureValue::simple(
            "Runtime.SerializationError",
            "Unable to stringify response body",
        )),
    }
}

fn failure_from_caught<'js>(ctx: &Ctx<'js>, err: rquickjs::Error) -> FailureValue {
    if matches!(err, rquickjs::Error::Exception) {
        let thrown = ctx.catch();
        capture_failure(ctx, thrown)
    } else {
        FailureValue::simple("Runtime.EngineError", err.to_string())
    }
}

/// Capture an arbitrary thrown or rejected value. Total: introspection
/// failures collapse to [`FailureValue::Opaque`] rather than propagating.
fn capture_failure<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> FailureValue {
    match try_capture_error(&value) {
        Ok(Some(failure)) => failure,
        Ok(None) => capture_non_error(ctx, value),
        Err(_) => FailureValue::Opaque,
    }
}

/// Capture a value that looks like an Error: string `name` and `message`,
/// optional string `stack`. Returns `Ok(None)` when the shape does not
/// match, `Err` when reading the shape itself raised.
fn try_capture_error(value: &Value<'_>) -> rquickjs::Result<Option<FailureValue>> {
    let Some(obj) = value.as_object() else {
        return Ok(None);
    };

    let name: Value = obj.get("name")?;
    let message: Value = obj.get("message")?;
    let (Some(name), Some(message)) = (as_plain_string(&name)?, as_plain_string(&message)?) else {
        return Ok(None);
    };

    let stack: Value = obj.get("stack")?;
    let stack = as_plain_string(&stack)?;

    let properties = capture_properties(obj).ok();
    Ok(Some(FailureValue::Error {
        name,
        message,
        stack,
        properties,
    }))
}

fn as_plain_string(value: &Value<'_>) -> rquickjs::Result<Option<String>> {
    match value.as_string() {
        Some(s) => Ok(Some(s.to_string()?)),
        None => Ok(None),
    }
}

#[derive(Debug)]
enum CaptureError {
    TooDeep,
    Js(rquickjs::Error),
}

impl From<rquickjs::Error> for CaptureError {
    fn from(err: rquickjs::Error) -> Self {
        Self::Js(err)
    }
}

/// Project the enumerable own properties of a thrown object to JSON.
fn capture_properties(
    obj: &Object<'_>,
) -> std::result::Result<serde_json::Map<String, serde_json::Value>, CaptureError> {
    let mut map = serde_json::Map::new();
    for item in obj.props::<String, Value>() {
        let (key, value) = item?;
        map.insert(key, js_to_json_bounded(&value, MAX_PROPERTY_DEPTH)?);
    }
    Ok(map)
}

fn js_to_json_bounded(
    value: &Value<'_>,
    depth: usize,
) -> std::result::Result<serde_json::Value, CaptureError> {
    if depth == 0 {
        return Err(CaptureError::TooDeep);
    }
    if value.is_null() || value.is_undefined() {
        return Ok(serde_json::Value::Null);
    }
    if let Some(b) = value.as_bool() {
        return Ok(serde_json::Value::Bool(b));
    }
    if let Some(i) = value.as_int() {
        return Ok(serde_json::json!(i));
    }
    if let Some(f) = value.as_float() {
        return Ok(serde_json::json!(f));
    }
    if let Some(s) = value.as_string() {
        return Ok(serde_json::Value::String(s.to_string()?));
    }
    if let Some(arr) = value.as_array() {
        let mut result = Vec::with_capacity(arr.len());
        for item in arr.iter::<Value>() {
            result.push(js_to_json_bounded(&item?, depth - 1)?);
        }
        return Ok(serde_json::Value::Array(result));
    }
    if let Some(obj) = value.as_object() {
        let mut result = serde_json::Map::new();
        for item in obj.props::<String, Value>() {
            let (k, v) = item?;
            result.insert(k, js_to_json_bounded(&v, depth - 1)?);
        }
        return Ok(serde_json::Value::Object(result));
    }
    // Functions, symbols, and other non-data values.
    Ok(serde_json::Value::Null)
}

fn capture_non_error<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> FailureValue {
    let type_name = typeof_name(value.type_of()).to_owned();
    match Coerced::<String>::from_js(ctx, value) {
        Ok(display) => FailureValue::Value {
            type_name,
            display: display.0,
        },
        // toString itself raised; nothing about the value is trusted.
        Err(_) => FailureValue::Opaque,
    }
}

fn typeof_name(ty: Type) -> &'static str {
    match ty {
        Type::Uninitialized | Type::Undefined => "undefined",
        Type::Bool => "boolean",
        Type::Int | Type::Float => "number",
        Type::String => "string",
        Type::Symbol => "symbol",
        Type::BigInt => "bigint",
        Type::Function | Type::Constructor => "function",
        _ => "object",
    }
}

// ============================================================================
// JS conversion and installed globals
// ============================================================================

fn json_to_js<'js>(ctx: &Ctx<'js>, value: &serde_json::Value) -> rquickjs::Result<Value<'js>> {
    use rquickjs::IntoJs;
    match value {
        serde_json::Value::Null => Ok(Value::new_null(ctx.clone())),
        serde_json::Value::Bool(b) => Ok(Value::new_bool(ctx.clone(), *b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64().and_then(|i| i32::try_from(i).ok()) {
                Ok(Value::new_int(ctx.clone(), i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::new_float(ctx.clone(), f))
            } else {
                Ok(Value::new_null(ctx.clone()))
            }
        }
        serde_json::Value::String(s) => s.clone().into_js(ctx),
        serde_json::Value::Array(arr) => {
            let js_arr = rquickjs::Array::new(ctx.clone())?;
            for (i, v) in arr.iter().enumerate() {
                js_arr.set(i, json_to_js(ctx, v)?)?;
            }
            Ok(js_arr.into_value())
        }
        serde_json::Value::Object(obj) => {
            let js_obj = Object::new(ctx.clone())?;
            for (k, v) in obj {
                js_obj.set(k.as_str(), json_to_js(ctx, v)?)?;
            }
            Ok(js_obj.into_value())
        }
    }
}

fn install_console(ctx: &Ctx<'_>) -> rquickjs::Result<()> {
    fn join(args: Rest<Coerced<String>>) -> String {
        args.0
            .into_iter()
            .map(|c| c.0)
            .collect::<Vec<_>>()
            .join(" ")
    }

    let console = Object::new(ctx.clone())?;
    console.set(
        "log",
        Func::from(|args: Rest<Coerced<String>>| {
            tracing::info!(target: "handler", "{}", join(args));
        }),
    )?;
    console.set(
        "info",
        Func::from(|args: Rest<Coerced<String>>| {
            tracing::info!(target: "handler", "{}", join(args));
        }),
    )?;
    console.set(
        "warn",
        Func::from(|args: Rest<Coerced<String>>| {
            tracing::warn!(target: "handler", "{}", join(args));
        }),
    )?;
    console.set(
        "error",
        Func::from(|args: Rest<Coerced<String>>| {
            tracing::error!(target: "handler", "{}", join(args));
        }),
    )?;
    ctx.globals().set("console", console)?;
    Ok(())
}

fn map_engine_error(err: &rquickjs::Error) -> Error {
    Error::engine(format!("QuickJS: {err}"))
}

/// CommonJS shim evaluated before the handler module.
const COMMONJS_SHIM: &str =
    "globalThis.module = { exports: {} }; globalThis.exports = globalThis.module.exports;";

/// Glue installed once at startup. `__invoke` runs the pinned handler and
/// writes the outcome into `__pending`; the slot is single-assignment, so
/// whichever completion signal lands first wins and the rest are no-ops.
const HARNESS_JS: &str = r#"
globalThis.__invoke = function (event, context) {
    const handler = globalThis.__handler;
    const pending = { state: "pending", value: undefined };
    globalThis.__pending = pending;
    let settled = false;
    const fulfill = function (value) {
        if (!settled) {
            settled = true;
            pending.state = "fulfilled";
            pending.value = value;
        }
    };
    const reject = function (error) {
        if (!settled) {
            settled = true;
            pending.state = "rejected";
            pending.value = error;
        }
    };
    const callback = function (error, result) {
        if (error === null || error === undefined) {
            fulfill(result);
        } else {
            reject(error);
        }
    };
    context.getRemainingTimeInMillis = function () {
        return Math.max(context.deadlineMs - Date.now(), 0);
    };
    try {
        const outcome = handler(event, context, callback);
        if (outcome !== null && outcome !== undefined && typeof outcome.then === "function") {
            outcome.then(fulfill, reject);
        } else if (handler.length < 3) {
            fulfill(outcome);
        }
    } catch (error) {
        reject(error);
    }
};
"#;
