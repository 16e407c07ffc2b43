//! Error types for the peer connection layer.

use std::time::Duration;

use telecall_signaling_core::SignalingError;
use thiserror::Error;

use crate::state::ConnectionState;

/// Result type alias for peer operations
pub type Result<T> = std::result::Result<T, PeerError>;

/// Failures reported by the underlying transport implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport rejects in-place track replacement mid-call; the
    /// manager falls back to a full renegotiation.
    #[error("transport does not support in-place track replacement")]
    ReplaceUnsupported,

    /// Operation invalid for the transport's current state.
    #[error("transport operation invalid: {details}")]
    InvalidState { details: String },

    /// No viable network path was found.
    #[error("no viable network path: {reason}")]
    IceFailure { reason: String },

    /// The transport has been closed.
    #[error("transport closed")]
    Closed,
}

/// Failures of the peer connection manager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    /// Operation not valid in the current connection state.
    #[error("cannot {operation} while {state}")]
    InvalidState { operation: &'static str, state: ConnectionState },

    /// The handshake failed. Terminal for this call attempt.
    #[error("negotiation failed: {reason}")]
    Negotiation { reason: String },

    /// The handshake did not complete within the configured bound.
    #[error("handshake timed out after {after:?}")]
    Timeout { after: Duration },

    /// No outgoing tracks attached before starting negotiation.
    #[error("no outgoing media tracks attached")]
    NoTracks,

    /// Underlying transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Signal delivery failure during the exchange.
    #[error(transparent)]
    Signaling(#[from] SignalingError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_names_operation_and_state() {
        let err = PeerError::InvalidState {
            operation: "apply answer",
            state: ConnectionState::Idle,
        };
        assert_eq!(err.to_string(), "cannot apply answer while idle");
    }

    #[test]
    fn transport_errors_convert() {
        let err: PeerError = TransportError::ReplaceUnsupported.into();
        assert!(matches!(err, PeerError::Transport(TransportError::ReplaceUnsupported)));
    }
}
