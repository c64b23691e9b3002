#![forbid(unsafe_code)]

//! Error types for notification delivery.

use thiserror::Error;

/// A transport could not deliver a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The receiving end has gone away.
    #[error("notification channel is closed")]
    Closed,

    #[error("failed to encode notification: {0}")]
    Encode(String),

    #[error("transport failed: {0}")]
    Other(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(err.to_string())
    }
}

/// Failure of a [`crate::NotificationService`] operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The service was disposed or its document dropped.
    #[error("notification service for document {0} is no longer active")]
    Inactive(String),
}
