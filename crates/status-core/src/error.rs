//! Error types for the call status engine

use thiserror::Error;

/// Failures at the session transport boundary.
///
/// Returned by [`SessionTransport`](crate::transport::SessionTransport)
/// implementations when an action cannot be handed to the connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport not connected")]
    NotConnected,

    #[error("Transport closed")]
    Closed,

    #[error("Failed to send action {action}: {reason}")]
    SendFailed { action: String, reason: String },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Malformed {event} event: {reason}")]
    MalformedEvent { event: String, reason: String },

    #[error("Engine has been torn down")]
    TornDown,
}

impl EngineError {
    pub fn malformed(event: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::MalformedEvent {
            event: event.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
