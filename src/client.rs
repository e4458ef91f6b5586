//! HTTP client for the Runtime API control plane.
//!
//! One client, one keep-alive connection, strictly serial use: the loop
//! never issues a request before the previous one finished. Fetch-next is a
//! long poll and carries no timeout; report POSTs have their bodies read and
//! discarded so the connection stays reusable.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};

use crate::error::Result;
use crate::report::{to_formatted, to_runtime_response, FailureValue};

const API_VERSION: &str = "2018-06-01";

pub const ERROR_TYPE_HEADER: &str = "Lambda-Runtime-Function-Error-Type";
pub const XRAY_CAUSE_HEADER: &str = "Lambda-Runtime-Function-XRay-Error-Cause";

/// One pending invocation as fetched from the control plane: the raw payload
/// plus the response headers the context is extracted from.
#[derive(Debug)]
pub struct NextInvocation {
    pub payload: String,
    pub headers: HeaderMap,
}

pub struct RuntimeClient {
    http: reqwest::Client,
    base: String,
}

impl RuntimeClient {
    /// Build a client against `host:port`.
    pub fn new(endpoint: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("javelin-js/{}", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(1)
            .build()?;
        Ok(Self {
            http,
            base: format!("http://{endpoint}/{API_VERSION}"),
        })
    }

    /// Long-poll for the next pending invocation.
    ///
    /// Any transport failure, including a non-success status, is fatal to
    /// the loop; there is no retry here because without a fresh invocation
    /// there is nothing to do.
    pub async fn next_invocation(&self) -> Result<NextInvocation> {
        let url = format!("{}/runtime/invocation/next", self.base);
        let response = self.http.get(&url).send().await?.error_for_status()?;
        let headers = response.headers().clone();
        let payload = response.text().await?;
        tracing::debug!(
            event = "client.next_invocation",
            bytes = payload.len(),
            "Fetched invocation"
        );
        Ok(NextInvocation { payload, headers })
    }

    /// Post a successful response. `body` is already JSON-encoded; a handler
    /// that produced nothing posts the literal `null`.
    pub async fn post_invocation_response(
        &self,
        request_id: &str,
        body: Option<&str>,
    ) -> Result<()> {
        let url = format!("{}/runtime/invocation/{request_id}/response", self.base);
        self.post(&url, body.unwrap_or("null").to_owned(), HeaderMap::new())
            .await
    }

    /// Report a per-invocation failure.
    pub async fn post_invocation_error(
        &self,
        request_id: &str,
        failure: &FailureValue,
    ) -> Result<()> {
        let url = format!("{}/runtime/invocation/{request_id}/error", self.base);
        self.post_error(&url, failure, true).await
    }

    /// Report a failure that prevented the handler from loading at all.
    pub async fn post_init_error(&self, failure: &FailureValue) -> Result<()> {
        let url = format!("{}/runtime/init/error", self.base);
        self.post_error(&url, failure, false).await
    }

    async fn post_error(&self, url: &str, failure: &FailureValue, with_cause: bool) -> Result<()> {
        let report = to_runtime_response(failure);
        let body = serde_json::to_string(&report)?;

        let mut headers = HeaderMap::new();
        set_header(&mut headers, ERROR_TYPE_HEADER, &report.error_type);
        if with_cause {
            set_header(&mut headers, XRAY_CAUSE_HEADER, &to_formatted(failure));
        }

        tracing::error!(
            event = "client.post_error",
            error_type = %report.error_type,
            error_message = %report.error_message,
            "Reporting failure"
        );
        self.post(url, body, headers).await
    }

    async fn post(&self, url: &str, body: String, headers: HeaderMap) -> Result<()> {
        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_LENGTH, body.len())
            .headers(headers)
            .body(body)
            .send()
            .await?;
        let status = response.status();
        // Read and discard so the connection goes back to the pool.
        let _ = response.bytes().await;
        if !status.is_success() {
            tracing::warn!(
                event = "client.post_rejected",
                url,
                status = %status,
                "Control plane returned non-success for a report"
            );
        }
        Ok(())
    }
}

/// Set a header if the value survives header-value validation; an illegal
/// value (stray control bytes, non-ASCII) costs the header, not the post.
fn set_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(parsed) => {
            headers.insert(name, parsed);
        }
        Err(_) => {
            tracing::warn!(event = "client.header_skipped", header = name, "Header value not encodable");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_carries_api_version() {
        let client = RuntimeClient::new("127.0.0.1:9001").unwrap();
        assert_eq!(client.base, "http://127.0.0.1:9001/2018-06-01");
    }

    #[test]
    fn header_values_with_control_bytes_are_skipped() {
        let mut headers = HeaderMap::new();
        set_header(&mut headers, ERROR_TYPE_HEADER, "bad\nvalue");
        assert!(headers.get(ERROR_TYPE_HEADER).is_none());
    }

    #[test]
    fn tab_prefixed_cause_is_a_legal_header_value() {
        let failure = FailureValue::simple("Error", "boom");
        let mut headers = HeaderMap::new();
        set_header(&mut headers, XRAY_CAUSE_HEADER, &to_formatted(&failure));
        assert!(headers.get(XRAY_CAUSE_HEADER).is_some());
    }
}
