//! The signaling wire contract.
//!
//! Every message is a tagged union addressed to a session. Messages are
//! fire-and-forget and tolerant of unordered delivery, with one exception:
//! a `candidate` is only meaningful once the `offer` that produced it has
//! been observed, so receivers buffer early candidates rather than drop
//! them (the peer layer owns that buffer).

use serde::{Deserialize, Serialize};

use crate::types::{ParticipantId, SessionId};

/// Which half of the offer/answer handshake an SDP blob represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A session description produced by one side of the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdpDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SdpDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpKind::Offer, sdp: sdp.into() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpKind::Answer, sdp: sdp.into() }
    }
}

/// A trickled network path candidate discovered during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

/// Typed signaling events exchanged between the two participants of a
/// session. The toggle variants are advisory mirrors for the remote UI,
/// never enforced on the media path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum SignalMessage {
    /// A participant entered the session.
    Join { participant: ParticipantId, display_name: String },
    /// A participant left the session.
    Leave { participant: ParticipantId },
    /// Media-capability offer from the calling side.
    Offer { sdp: SdpDescription },
    /// Answer from the called side.
    Answer { sdp: SdpDescription },
    /// A trickled ICE candidate, sent as soon as discovered.
    Candidate { candidate: IceCandidate },
    /// Advisory: the sender muted/unmuted their microphone.
    ToggleAudio { enabled: bool },
    /// Advisory: the sender enabled/disabled their camera.
    ToggleVideo { enabled: bool },
    /// Advisory: the sender started/stopped screen sharing.
    ToggleScreen { active: bool },
    /// The call was explicitly ended.
    End,
}

impl SignalMessage {
    /// Short tag used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::Candidate { .. } => "candidate",
            Self::ToggleAudio { .. } => "toggle-audio",
            Self::ToggleVideo { .. } => "toggle-video",
            Self::ToggleScreen { .. } => "toggle-screen",
            Self::End => "end",
        }
    }
}

/// A signal together with its addressing: which session it belongs to and
/// which participant sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    pub session_id: SessionId,
    pub sender: ParticipantId,
    pub message: SignalMessage,
}

impl SignalEnvelope {
    pub fn new(session_id: SessionId, sender: ParticipantId, message: SignalMessage) -> Self {
        Self { session_id, sender, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn messages_serialize_with_kebab_case_tags() {
        let msg = SignalMessage::ToggleAudio { enabled: false };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "toggle-audio");
        assert_eq!(json["payload"]["enabled"], false);
    }

    #[test]
    fn offer_round_trips_through_json() {
        let env = SignalEnvelope::new(
            SessionId::from("consult-42"),
            ParticipantId::from("dr-lee"),
            SignalMessage::Offer { sdp: SdpDescription::offer("v=0 fake") },
        );
        let json = serde_json::to_string(&env).unwrap();
        let back: SignalEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn end_has_no_payload() {
        let json = serde_json::to_value(SignalMessage::End).unwrap();
        assert_eq!(json["kind"], "end");
        assert!(json.get("payload").is_none());
    }
}
