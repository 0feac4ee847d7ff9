//! Error types for igniteworks.

use thiserror::Error;

/// The main error type for igniteworks operations.
#[derive(Debug, Error)]
pub enum IgniteError {
    /// Missing or malformed client configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The server address could not be split into host and port.
    #[error("Invalid server address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    /// `execute` was called without statement text.
    #[error("No SQL statement provided")]
    MissingStatement,

    /// Operation attempted on a closed connection.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operation attempted on a closed cursor.
    #[error("Cursor closed")]
    CursorClosed,

    /// Fetch attempted before any successful execute.
    #[error("No result available. execute() or execute_many() must be called first")]
    NoResult,

    /// Transport failure (connect, handshake, TLS negotiation, broken socket).
    #[error("Connection error: {0}")]
    Connection(String),

    /// The transport gave up waiting on the server.
    #[error("Timeout after {0} ms")]
    Timeout(u128),

    /// The server rejected the statement or failed while running it.
    #[error("Execution error: {message}")]
    Execution {
        message: String,
        trace: Option<String>,
    },

    /// A returned value or metadata row had an unexpected shape.
    #[error("Data error: {0}")]
    Data(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// DB-API exception class an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Interface,
    Programming,
    Operational,
    Internal,
    Integrity,
    Data,
    NotSupported,
}

impl IgniteError {
    /// Create an invalid address error.
    pub fn address(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Create a remote execution error without a server trace.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            trace: None,
        }
    }

    /// The DB-API class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Config(_)
            | Self::InvalidAddress { .. }
            | Self::MissingStatement
            | Self::ConnectionClosed
            | Self::CursorClosed
            | Self::NoResult
            | Self::Execution { .. } => ErrorClass::Programming,
            Self::Connection(_) | Self::Timeout(_) | Self::Io(_) => ErrorClass::Operational,
            Self::Data(_) => ErrorClass::Data,
        }
    }

    /// True for errors raised before any transport call was made.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::InvalidAddress { .. } | Self::MissingStatement
        )
    }

    /// Server-side error trace, when the transport reported one.
    pub fn trace(&self) -> Option<&str> {
        match self {
            Self::Execution { trace, .. } => trace.as_deref(),
            _ => None,
        }
    }
}

/// Result type alias for igniteworks operations.
pub type IgniteResult<T> = Result<T, IgniteError>;
