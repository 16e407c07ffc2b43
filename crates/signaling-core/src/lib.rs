//! Session-scoped signaling for telecall.
//!
//! A signaling channel is a persistent, bidirectional message transport
//! scoped to one session identifier. It delivers typed [`SignalMessage`]s
//! to exactly the other participant in the same session. Delivery is
//! at-most-once per connected channel instance and in-order within that
//! instance; callers must tolerate loss across reconnects.

pub mod channel;
pub mod error;
pub mod message;
pub mod relay;
pub mod types;

pub use channel::{SignalingConnector, SignalingHandle, SignalingTransport};
pub use error::{Error, Result, SignalingError};
pub use message::{IceCandidate, SdpDescription, SdpKind, SignalEnvelope, SignalMessage};
pub use relay::{MemoryRelay, RelayConnector};
pub use types::{ParticipantId, SessionId};
