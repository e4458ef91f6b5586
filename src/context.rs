//! Per-invocation context extracted from control-plane response headers.

use reqwest::header::HeaderMap;
use serde_json::{json, Value};

use crate::config::FunctionIdentity;
use crate::error::{Error, Result};

pub const REQUEST_ID_HEADER: &str = "lambda-runtime-aws-request-id";
pub const FUNCTION_ARN_HEADER: &str = "lambda-runtime-invoked-function-arn";
pub const DEADLINE_MS_HEADER: &str = "lambda-runtime-deadline-ms";
pub const CLIENT_CONTEXT_HEADER: &str = "lambda-runtime-client-context";
pub const COGNITO_IDENTITY_HEADER: &str = "lambda-runtime-cognito-identity";
pub const TRACE_ID_HEADER: &str = "lambda-runtime-trace-id";

/// Metadata for one invocation, owned by one loop iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationContext {
    pub request_id: String,
    pub invoked_function_arn: String,
    /// Absolute deadline in epoch milliseconds, 0 when absent.
    pub deadline_ms: u64,
    pub client_context: Option<Value>,
    pub cognito_identity: Option<Value>,
    pub trace_id: Option<String>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_json(headers: &HeaderMap, name: &str) -> Option<Value> {
    let raw = header_str(headers, name)?;
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                event = "context.header_parse_failed",
                header = name,
                error = %err,
                "Ignoring unparsable JSON header"
            );
            None
        }
    }
}

impl InvocationContext {
    /// Build a context from the fetch-next response headers.
    ///
    /// A missing or empty request id means the response cannot be correlated
    /// with a report; that is a protocol violation, not an invocation error.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self> {
        let request_id = header_str(headers, REQUEST_ID_HEADER)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                Error::protocol(format!("invocation response is missing {REQUEST_ID_HEADER}"))
            })?
            .to_owned();

        let deadline_ms = header_str(headers, DEADLINE_MS_HEADER)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Ok(Self {
            request_id,
            invoked_function_arn: header_str(headers, FUNCTION_ARN_HEADER)
                .unwrap_or_default()
                .to_owned(),
            deadline_ms,
            client_context: header_json(headers, CLIENT_CONTEXT_HEADER),
            cognito_identity: header_json(headers, COGNITO_IDENTITY_HEADER),
            trace_id: header_str(headers, TRACE_ID_HEADER).map(str::to_owned),
        })
    }

    /// The JSON object handed to the handler as its second argument.
    pub fn handler_object(&self, identity: &FunctionIdentity) -> Value {
        json!({
            "awsRequestId": self.request_id,
            "invokedFunctionArn": self.invoked_function_arn,
            "deadlineMs": self.deadline_ms,
            "functionName": identity.function_name,
            "functionVersion": identity.function_version,
            "memoryLimitInMB": identity.memory_limit_mb,
            "logGroupName": identity.log_group_name,
            "logStreamName": identity.log_stream_name,
            "clientContext": self.client_context,
            "identity": self.cognito_identity,
        })
    }
}
