//! Javelin - runtime interface client for JavaScript handlers
//!
//! Bridges a Lambda-style Runtime API control plane and a user handler
//! running on embedded QuickJS:
//! - Fetch the next pending invocation over a single keep-alive connection
//! - Invoke the resolved handler with the payload and a context object
//! - Post the JSON response, or a normalized error report, back
//!
//! The crate is primarily the implementation of the `javelin` binary;
//! modules are public so integration tests can drive the loop against a
//! mock control plane.

#![forbid(unsafe_code)]

pub mod cli;
pub mod client;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod report;
pub mod runner;

pub use error::{Error, Result};
