//! Error types for the signaling layer.

use thiserror::Error;

/// Result type alias for signaling operations
pub type Result<T> = std::result::Result<T, SignalingError>;

/// Alias kept for crates that import `Error` generically
pub type Error = SignalingError;

/// Errors surfaced by signaling transports and the relay.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalingError {
    /// A signal could not be delivered after bounded retries. The session
    /// owning this channel must move to the failed state.
    #[error("signal delivery failed after {attempts} attempts")]
    Delivery { attempts: u32 },

    /// Operation attempted on a channel that is not connected.
    #[error("signaling channel is not connected")]
    NotConnected,

    /// A second connect for the same session from the same client. The
    /// session coordinator connects exactly once per session lifecycle.
    #[error("client {participant} is already connected to session {session}")]
    AlreadyConnected { session: String, participant: String },

    /// The session already has two participants.
    #[error("session {session} is full")]
    SessionFull { session: String },

    /// The channel was closed by the transport.
    #[error("signaling channel closed")]
    Closed,
}

impl SignalingError {
    pub fn delivery(attempts: u32) -> Self {
        Self::Delivery { attempts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_error_reports_attempts() {
        let err = SignalingError::delivery(3);
        assert_eq!(err.to_string(), "signal delivery failed after 3 attempts");
    }

    #[test]
    fn errors_are_distinct_messages() {
        let full = SignalingError::SessionFull { session: "s1".into() };
        let closed = SignalingError::Closed;
        assert_ne!(full.to_string(), closed.to_string());
    }
}
