//! Session-level data model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use telecall_peer_core::ConnectionState;
use telecall_signaling_core::{ParticipantId, SessionId};

/// One person in the consultation, local or remote. The media flags on a
/// remote participant are advisory mirrors of their toggle signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub is_local: bool,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub screen_sharing: bool,
}

impl Participant {
    pub fn new(id: ParticipantId, display_name: impl Into<String>, is_local: bool) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            is_local,
            audio_enabled: true,
            video_enabled: true,
            screen_sharing: false,
        }
    }
}

/// Record of one consultation call. Created at join, never reused; a new
/// call means a new session record.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub local_participant: ParticipantId,
    pub state: ConnectionState,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(id: SessionId, local_participant: ParticipantId) -> Self {
        Self {
            id,
            local_participant,
            state: ConnectionState::Idle,
            created_at: Utc::now(),
            connected_at: None,
            ended_at: None,
        }
    }
}

/// Which media capability a toggle signal refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaToggleKind {
    Audio,
    Video,
    Screen,
}

/// Why a session reached the ended state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The local participant hung up.
    LocalHangup,
    /// The remote participant ended the call.
    RemoteHangup,
    /// The remote participant left the session.
    RemoteLeft,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalHangup => write!(f, "local hangup"),
            Self::RemoteHangup => write!(f, "remote hangup"),
            Self::RemoteLeft => write!(f, "remote left"),
        }
    }
}
