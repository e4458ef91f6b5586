//! Failure normalization pipeline.
//!
//! Everything a handler can throw, reject with, or pass to its callback is
//! captured as a [`FailureValue`] and rendered two ways:
//!
//! - [`to_runtime_response`]: the `{errorType, errorMessage, trace}` shape
//!   posted to the control plane. Total; there is no input it fails on.
//! - [`to_formatted`]: a tab-prefixed single-line JSON diagnostic for the log
//!   stream, surfacing custom enumerable properties when the capture kept
//!   them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::Error;

/// Message used when a failure could not even be introspected safely.
pub const OPAQUE_FAILURE_MESSAGE: &str = "callback called with Error argument, \
     but there was a problem while retrieving one or more of its message, name, and stack";

/// Error type reported for failures that resisted introspection.
pub const OPAQUE_FAILURE_TYPE: &str = "handled";

/// An owned capture of an arbitrary failure raised by user code or the
/// harness itself. Captured eagerly so no live engine handle is needed to
/// report it.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureValue {
    /// An error-shaped value: string `name` and `message` were present.
    Error {
        name: String,
        message: String,
        /// Raw stack string when one was present.
        stack: Option<String>,
        /// Enumerable own properties rendered to JSON, `None` when that
        /// rendering failed (circular structures, hostile getters).
        properties: Option<Map<String, Value>>,
    },
    /// Any non-error value: its `typeof` tag and a best-effort string form.
    Value { type_name: String, display: String },
    /// Introspection itself failed; nothing about the value is trusted.
    Opaque,
}

impl FailureValue {
    /// Capture a plain error-shaped failure with no extra properties.
    pub fn simple(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            name: name.into(),
            message: message.into(),
            stack: None,
            properties: None,
        }
    }
}

impl From<&Error> for FailureValue {
    fn from(err: &Error) -> Self {
        Self::simple(err.wire_type(), err.to_string())
    }
}

/// The normalized wire shape accepted by the control plane's error endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub error_type: String,
    pub error_message: String,
    pub trace: Vec<String>,
}

fn stack_lines(stack: Option<&str>) -> Vec<String> {
    match stack {
        Some(s) if !s.is_empty() => s.split('\n').map(str::to_owned).collect(),
        _ => Vec::new(),
    }
}

/// Normalize a captured failure. Never fails: every arm produces a report
/// that is plain strings and a string list, always JSON-encodable.
pub fn to_runtime_response(failure: &FailureValue) -> ErrorReport {
    match failure {
        FailureValue::Error {
            name,
            message,
            stack,
            ..
        } => ErrorReport {
            error_type: name.clone(),
            error_message: message.clone(),
            trace: stack_lines(stack.as_deref()),
        },
        FailureValue::Value { type_name, display } => ErrorReport {
            error_type: type_name.clone(),
            error_message: display.clone(),
            trace: Vec::new(),
        },
        FailureValue::Opaque => ErrorReport {
            error_type: OPAQUE_FAILURE_TYPE.to_owned(),
            error_message: OPAQUE_FAILURE_MESSAGE.to_owned(),
            trace: Vec::new(),
        },
    }
}

/// Render the tab-prefixed diagnostic line for the log stream.
///
/// Error-shaped failures with an intact property capture get the extended
/// rendering: normalized fields plus the split stack plus every custom
/// enumerable property. Anything else falls back to the normalized shape.
pub fn to_formatted(failure: &FailureValue) -> String {
    if let FailureValue::Error {
        name,
        message,
        stack,
        properties: Some(props),
    } = failure
    {
        let mut extended = Map::new();
        extended.insert("errorType".to_owned(), json!(name));
        extended.insert("errorMessage".to_owned(), json!(message));
        if let Some(Value::String(code)) = props.get("code") {
            extended.insert("code".to_owned(), json!(code));
        }
        extended.insert("stack".to_owned(), json!(stack_lines(stack.as_deref())));
        for (key, value) in props {
            if matches!(key.as_str(), "name" | "message" | "stack" | "code") {
                continue;
            }
            extended.insert(key.clone(), value.clone());
        }
        if let Ok(body) = serde_json::to_string(&Value::Object(extended)) {
            return format!("\t{body}");
        }
    }

    let report = to_runtime_response(failure);
    // A report is strings all the way down; encoding cannot fail.
    let body = serde_json::to_string(&report).unwrap_or_default();
    format!("\t{body}")
}
