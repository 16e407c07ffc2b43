//! Session connection state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one session's connection. Exactly one instance per session.
///
/// `Ended` and `Failed` are terminal; both trigger identical full resource
/// release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No call in progress.
    #[default]
    Idle,

    /// Waiting on the host environment for camera/microphone access.
    AcquiringMedia,

    /// Offer/answer/candidate exchange in progress.
    Negotiating,

    /// The transport reports an established media path.
    Connected,

    /// The call ended normally (local or remote hangup, transport close).
    Ended,

    /// Negotiation or transport failure. Terminal.
    Failed,
}

impl ConnectionState {
    /// Whether the state machine can never leave this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Failed)
    }

    /// Whether a call attempt is underway or live.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::AcquiringMedia | Self::Negotiating | Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::AcquiringMedia => write!(f, "acquiring-media"),
            Self::Negotiating => write!(f, "negotiating"),
            Self::Connected => write!(f, "connected"),
            Self::Ended => write!(f, "ended"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
