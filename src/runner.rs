//! The invocation loop.
//!
//! Strictly sequential: fetch, invoke, report, repeat. Exactly one terminal
//! report is posted per fetched invocation, always with that invocation's
//! request id, and the next fetch does not start until the report POST
//! finished.

use crate::client::RuntimeClient;
use crate::config::FunctionIdentity;
use crate::context::InvocationContext;
use crate::engine::{InvokeOutcome, JsEngine};
use crate::error::Result;
use crate::report::FailureValue;

/// Environment variable handlers read the trace id from.
const TRACE_ID_ENV: &str = "_X_AMZN_TRACE_ID";

pub struct Runner {
    client: RuntimeClient,
    engine: JsEngine,
    identity: FunctionIdentity,
}

impl Runner {
    pub fn new(client: RuntimeClient, engine: JsEngine, identity: FunctionIdentity) -> Self {
        Self {
            client,
            engine,
            identity,
        }
    }

    /// Run until a transport or protocol error makes progress impossible.
    pub async fn run(&self) -> Result<()> {
        loop {
            self.run_once().await?;
        }
    }

    /// One full iteration: fetch, invoke, post exactly one report.
    pub async fn run_once(&self) -> Result<()> {
        let next = self.client.next_invocation().await?;
        let context = InvocationContext::from_headers(&next.headers)?;
        tracing::info!(
            event = "runner.invocation",
            request_id = %context.request_id,
            deadline_ms = context.deadline_ms,
            "Invoking handler"
        );

        match &context.trace_id {
            Some(trace_id) => std::env::set_var(TRACE_ID_ENV, trace_id),
            None => std::env::remove_var(TRACE_ID_ENV),
        }

        let handler_context = context.handler_object(&self.identity);
        match self.engine.invoke(&next.payload, &handler_context) {
            Ok(InvokeOutcome::Response(body)) => {
                self.client
                    .post_invocation_response(&context.request_id, Some(&body))
                    .await?;
            }
            Ok(InvokeOutcome::Failure(failure)) => {
                self.client
                    .post_invocation_error(&context.request_id, &failure)
                    .await?;
            }
            Err(err) => {
                // The engine itself broke. Report this invocation, then let
                // the error stop the loop.
                let failure = FailureValue::from(&err);
                self.client
                    .post_invocation_error(&context.request_id, &failure)
                    .await?;
                return Err(err);
            }
        }
        Ok(())
    }
}
