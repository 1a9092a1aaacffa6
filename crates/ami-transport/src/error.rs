//! Error types for the AMI client

use thiserror::Error;

use callstatus_core::TransportError;

#[derive(Error, Debug)]
pub enum AmiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("Timed out waiting for response to {0}")]
    ResponseTimeout(String),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection closed")]
    Closed,
}

impl AmiError {
    /// Map onto the engine's transport error for the given action.
    pub fn into_transport_error(self, action: &str) -> TransportError {
        match self {
            AmiError::Closed => TransportError::Closed,
            other => TransportError::SendFailed {
                action: action.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, AmiError>;
