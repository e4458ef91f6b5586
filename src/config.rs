//! Runtime configuration, merged from CLI flags and the environment.

use std::path::PathBuf;

use crate::cli::Cli;
use crate::error::{Error, Result};

pub const ENV_HANDLER: &str = "_HANDLER";
pub const ENV_TASK_ROOT: &str = "LAMBDA_TASK_ROOT";
pub const ENV_RUNTIME_API: &str = "AWS_LAMBDA_RUNTIME_API";

/// Static function identity, surfaced to handlers through the context
/// object. All fields come from the standard environment variables and
/// default to empty strings when unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionIdentity {
    pub function_name: String,
    pub function_version: String,
    pub memory_limit_mb: String,
    pub log_group_name: String,
    pub log_stream_name: String,
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Raw handler descriptor, parsed later by the resolver.
    pub handler: String,
    /// Directory handler modules are resolved under.
    pub task_root: PathBuf,
    /// `host:port` of the Runtime API control plane.
    pub runtime_api: String,
    pub identity: FunctionIdentity,
}

impl Config {
    /// Resolve configuration from CLI arguments and the process environment.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        Self::resolve_with(cli, |key| std::env::var(key).ok())
    }

    /// Resolution with an injected environment lookup. CLI flags win over
    /// environment variables; the handler descriptor and the Runtime API
    /// endpoint are required, the task root defaults to the working
    /// directory.
    pub fn resolve_with(cli: &Cli, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let handler = cli
            .handler
            .clone()
            .or_else(|| env(ENV_HANDLER))
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                Error::config(format!("no handler given and {ENV_HANDLER} is not set"))
            })?;

        let task_root = cli
            .task_root
            .clone()
            .or_else(|| env(ENV_TASK_ROOT).filter(|r| !r.is_empty()).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));

        let runtime_api = cli
            .runtime_api
            .clone()
            .or_else(|| env(ENV_RUNTIME_API))
            .filter(|api| !api.is_empty())
            .ok_or_else(|| {
                Error::config(format!(
                    "no Runtime API endpoint given and {ENV_RUNTIME_API} is not set"
                ))
            })?;

        let var = |key: &str| env(key).unwrap_or_default();
        let identity = FunctionIdentity {
            function_name: var("AWS_LAMBDA_FUNCTION_NAME"),
            function_version: var("AWS_LAMBDA_FUNCTION_VERSION"),
            memory_limit_mb: var("AWS_LAMBDA_FUNCTION_MEMORY_SIZE"),
            log_group_name: var("AWS_LAMBDA_LOG_GROUP_NAME"),
            log_stream_name: var("AWS_LAMBDA_LOG_STREAM_NAME"),
        };

        Ok(Self {
            handler,
            task_root,
            runtime_api,
            identity,
        })
    }
}
