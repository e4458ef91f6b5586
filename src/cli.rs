//! Command-line interface definition.

use std::path::PathBuf;

use clap::Parser;

/// Runtime interface client for JavaScript handlers.
///
/// Flags override the standard environment variables, which keeps local runs
/// (`javelin index.handler --runtime-api 127.0.0.1:9001`) one-liners while a
/// packaged runtime configures everything through the environment.
#[derive(Parser, Debug, Default)]
#[command(name = "javelin", version, about)]
pub struct Cli {
    /// Handler descriptor, e.g. `index.handler` (default: $_HANDLER)
    pub handler: Option<String>,

    /// Directory the handler module is resolved under (default: $LAMBDA_TASK_ROOT)
    #[arg(long)]
    pub task_root: Option<PathBuf>,

    /// host:port of the Runtime API (default: $AWS_LAMBDA_RUNTIME_API)
    #[arg(long)]
    pub runtime_api: Option<String>,
}
