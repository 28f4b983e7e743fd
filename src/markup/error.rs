//! Errors talking to an external markup language server.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to spawn markup server '{command}': {reason}")]
    Spawn { command: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("markup server returned error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("markup server stopped")]
    Stopped,
}

pub type ProxyResult<T> = Result<T, ProxyError>;
