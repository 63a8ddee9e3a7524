//! Error types for the KrillClaw runtime.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded
//! context has its own error enum; the top-level `Error` composes them.

use thiserror::Error;

/// The top-level error type for all KrillClaw operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures surfaced by the LLM client. Never retried internally; the
/// driver layer decides what to do.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Server error (status {status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("HTTP error (status {status}): {message}")]
    HttpError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Out of memory")]
    OutOfMemory,
}

impl ClientError {
    /// Map an HTTP status code to the corresponding error variant.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => ClientError::AuthError(message),
            429 => ClientError::RateLimited,
            500..=599 => ClientError::ServerError { status, message },
            _ => ClientError::HttpError { status, message },
        }
    }
}

/// Failures on the byte-pipe carriers (BLE, serial) and their framing.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Message too large: {len} bytes (limit {max})")]
    MessageTooLarge { len: usize, max: usize },

    #[error("Malformed envelope: {0}")]
    BadEnvelope(String),

    #[error("{0} is not supported on this transport")]
    Unsupported(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures inside the tool dispatcher. These never abort the loop.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid tool input: {0}")]
    InvalidInput(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Unknown tool: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            ClientError::from_status(401, "bad key".into()),
            ClientError::AuthError(_)
        ));
        assert!(matches!(
            ClientError::from_status(429, String::new()),
            ClientError::RateLimited
        ));
        assert!(matches!(
            ClientError::from_status(503, String::new()),
            ClientError::ServerError { status: 503, .. }
        ));
        assert!(matches!(
            ClientError::from_status(404, String::new()),
            ClientError::HttpError { status: 404, .. }
        ));
    }

    #[test]
    fn errors_display() {
        let err = Error::Client(ClientError::ServerError {
            status: 500,
            message: "overloaded".into(),
        });
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("overloaded"));

        let err = Error::Tool(ToolError::PolicyViolation("Path not allowed".into()));
        assert!(err.to_string().contains("Path not allowed"));
    }

    #[test]
    fn transport_error_composes() {
        let err: Error = TransportError::MessageTooLarge { len: 70000, max: 65535 }.into();
        assert!(err.to_string().contains("70000"));
    }
}
