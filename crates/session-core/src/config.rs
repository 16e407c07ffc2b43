//! Session configuration.

use std::time::Duration;

use telecall_media_core::MediaConstraints;
use telecall_signaling_core::ParticipantId;

/// Tunables for one [`SessionCoordinator`](crate::SessionCoordinator).
///
/// The defaults are the production values; tests shorten the handshake
/// timeout to keep failure paths fast.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Name shown to the other participant.
    pub display_name: String,

    /// Local participant identity. Generated when not set.
    pub participant_id: Option<ParticipantId>,

    /// Capture constraints for the camera/microphone request.
    pub constraints: MediaConstraints,

    /// Upper bound on the offer/answer/candidate exchange. A handshake
    /// still negotiating past this bound moves the session to failed.
    pub handshake_timeout: Duration,

    /// How many times a failed signal send is retried before the delivery
    /// error is surfaced.
    pub signaling_send_retries: u32,

    /// Granularity of the call duration counter.
    pub duration_tick: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            display_name: "guest".to_string(),
            participant_id: None,
            constraints: MediaConstraints::default(),
            handshake_timeout: Duration::from_secs(30),
            signaling_send_retries: 3,
            duration_tick: Duration::from_secs(1),
        }
    }
}

impl SessionConfig {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self { display_name: display_name.into(), ..Self::default() }
    }

    pub fn with_participant_id(mut self, id: impl Into<String>) -> Self {
        self.participant_id = Some(ParticipantId::new(id));
        self
    }

    pub fn with_constraints(mut self, constraints: MediaConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_signaling_send_retries(mut self, retries: u32) -> Self {
        self.signaling_send_retries = retries;
        self
    }
}
