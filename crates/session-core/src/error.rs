//! Error types for the session coordination layer.

use telecall_media_core::MediaError;
use telecall_peer_core::{ConnectionState, PeerError, TransportError};
use telecall_signaling_core::SignalingError;
use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Failures surfaced by the session coordinator.
///
/// Media and signaling failures keep their own taxonomy and are wrapped
/// transparently; callers match on the source to decide whether the session
/// is recoverable (acquisition failures are, delivery and negotiation
/// failures are not).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Operation requires a joined session.
    #[error("not joined to a session")]
    NotJoined,

    /// The coordinator connects to signaling exactly once per lifecycle.
    #[error("already joined to a session")]
    AlreadyJoined,

    /// Operation not valid in the current session state.
    #[error("cannot {operation} while {state}")]
    InvalidState { operation: &'static str, state: ConnectionState },

    /// Local media acquisition failed.
    #[error(transparent)]
    Media(#[from] MediaError),

    /// The peer connection layer failed.
    #[error(transparent)]
    Peer(#[from] PeerError),

    /// Signal delivery failed.
    #[error(transparent)]
    Signaling(#[from] SignalingError),
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        Self::Peer(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_names_operation_and_state() {
        let err = SessionError::InvalidState {
            operation: "toggle screen share",
            state: ConnectionState::Idle,
        };
        assert_eq!(err.to_string(), "cannot toggle screen share while idle");
    }

    #[test]
    fn wrapped_errors_keep_their_messages() {
        let media: SessionError = MediaError::NotSupported.into();
        assert_eq!(
            media.to_string(),
            MediaError::NotSupported.to_string(),
        );
        let signaling: SessionError = SignalingError::delivery(3).into();
        assert_eq!(signaling.to_string(), SignalingError::delivery(3).to_string());
    }
}
