//! Error types for the javelin runtime client.

use thiserror::Error;

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the javelin runtime client.
///
/// Variants that correspond to a control-plane error category carry a stable
/// wire name (see [`Error::wire_type`]). Transport and protocol errors never
/// reach the control plane; they terminate the loop instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Handler descriptor failed validation before any filesystem access
    #[error("{0}")]
    MalformedHandlerName(String),

    /// Handler module could not be located or loaded
    #[error("{0}")]
    ImportModule(String),

    /// Handler module failed to parse
    #[error("{0}")]
    UserCodeSyntax(String),

    /// Export walk ended on a missing or non-callable value
    #[error("{0}")]
    HandlerNotFound(String),

    /// Handler finished without settling its result
    #[error("{0}")]
    HandlerDidNotSettle(String),

    /// Control-plane request could not be completed
    #[error("Transport error: {0}")]
    Transport(#[from] Box<reqwest::Error>),

    /// Control plane responded outside the protocol contract
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JS engine failures outside user code (context setup, conversion)
    #[error("Engine error: {0}")]
    Engine(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] Box<std::io::Error>),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] Box<serde_json::Error>),
}

impl Error {
    /// Create a malformed-handler-name error.
    pub fn malformed_handler(message: impl Into<String>) -> Self {
        Self::MalformedHandlerName(message.into())
    }

    /// Create an import-module error.
    pub fn import_module(message: impl Into<String>) -> Self {
        Self::ImportModule(message.into())
    }

    /// Create a user-code-syntax error.
    pub fn user_code_syntax(message: impl Into<String>) -> Self {
        Self::UserCodeSyntax(message.into())
    }

    /// Create a handler-not-found error.
    pub fn handler_not_found(message: impl Into<String>) -> Self {
        Self::HandlerNotFound(message.into())
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an engine error.
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine(message.into())
    }

    /// The error-type string reported to the control plane for this variant.
    pub fn wire_type(&self) -> &'static str {
        match self {
            Self::MalformedHandlerName(_) => "Runtime.MalformedHandlerName",
            Self::ImportModule(_) => "Runtime.ImportModuleError",
            Self::UserCodeSyntax(_) => "Runtime.UserCodeSyntaxError",
            Self::HandlerNotFound(_) => "Runtime.HandlerNotFound",
            Self::HandlerDidNotSettle(_) => "Runtime.HandlerDidNotSettle",
            Self::Transport(_) => "Runtime.TransportError",
            Self::Protocol(_) => "Runtime.ProtocolError",
            Self::Config(_) => "Runtime.ConfigError",
            Self::Engine(_) => "Runtime.EngineError",
            Self::Io(_) => "Runtime.IoError",
            Self::Json(_) => "Runtime.SerializationError",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Box::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Box::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(Box::new(value))
    }
}
