//! Error types for Reel Core

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ListenerId;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    // Event bus errors
    #[error("could not find any listener with id {id}")]
    ListenerNotFound { id: ListenerId },

    #[error("event name must not be empty")]
    EmptyEventName,

    // Engine errors
    #[error("Engine failure: {0}")]
    Engine(#[from] EngineError),

    #[error("Signal channel closed")]
    SignalChannelClosed,

    #[error("Playback already destroyed")]
    PlaybackDestroyed,

    // Source errors
    #[error("No engine can play source: {source_url}")]
    UnsupportedSource { source_url: String },

    // Configuration errors
    #[error("Invalid option '{key}': {reason}")]
    InvalidOption { key: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid option error
    pub fn invalid_option(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidOption {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the caller can carry on after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ListenerNotFound { .. }
                | Error::EmptyEventName
                | Error::UnsupportedSource { .. }
                | Error::InvalidOption { .. }
        )
    }

    /// Returns the error code for analytics
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::ListenerNotFound { .. } => "LISTENER_NOT_FOUND",
            Error::EmptyEventName => "EMPTY_EVENT_NAME",
            Error::Engine(_) => "ENGINE",
            Error::SignalChannelClosed => "SIGNAL_CHANNEL_CLOSED",
            Error::PlaybackDestroyed => "PLAYBACK_DESTROYED",
            Error::UnsupportedSource { .. } => "UNSUPPORTED_SOURCE",
            Error::InvalidOption { .. } => "INVALID_OPTION",
            Error::Json(_) => "JSON",
        }
    }
}

/// Terminal failure reported by a media engine.
///
/// Carried verbatim in the `error` event payload.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct EngineError {
    /// Engine specific error code
    pub code: String,
    /// Human readable description
    pub message: String,
}

impl EngineError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_lookup_is_recoverable() {
        let err = Error::ListenerNotFound { id: ListenerId::new() };
        assert!(err.is_recoverable());
        assert_eq!(err.error_code(), "LISTENER_NOT_FOUND");
    }

    #[test]
    fn test_engine_error_is_fatal() {
        let err: Error = EngineError::new("-11800", "The operation could not be completed").into();
        assert!(!err.is_recoverable());
        assert_eq!(err.error_code(), "ENGINE");
        assert_eq!(
            err.to_string(),
            "Engine failure: -11800: The operation could not be completed"
        );
    }
}
