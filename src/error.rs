//! Error types for extension-bridge.

use thiserror::Error;

/// Main error type for extension-bridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Missing or malformed caller input.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A session with the given key already exists.
    #[error("session already exists: {0}")]
    SessionExists(String),

    /// No live session with the given key.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::session::SessionState,
        to: crate::session::SessionState,
    },

    /// WebSocket handshake or mid-stream failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Payload could not be decoded or merged.
    #[error("decode error: {0}")]
    Decode(String),

    /// Forwarded HTTP request failed.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,
}

impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(e: reqwest::Error) -> Self {
        Self::Upstream(e.to_string())
    }
}

/// Convenience Result type for extension-bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_not_found_display() {
        let err = BridgeError::SessionNotFound("ticker".into());
        assert!(err.to_string().contains("ticker"));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_session_exists_display() {
        let err = BridgeError::SessionExists("depth".into());
        assert!(err.to_string().contains("depth"));
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let err: BridgeError = io_err.into();
        assert!(matches!(err, BridgeError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_tungstenite_error_conversion() {
        let err: BridgeError = tokio_tungstenite::tungstenite::Error::ConnectionClosed.into();
        assert!(matches!(err, BridgeError::Transport(_)));
        assert!(err.to_string().contains("transport error"));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = BridgeError::InvalidStateTransition {
            from: crate::session::SessionState::Closed,
            to: crate::session::SessionState::Open,
        };
        assert!(err.to_string().contains("Closed"));
        assert!(err.to_string().contains("Open"));
    }
}
