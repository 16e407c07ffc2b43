//! Peer connection management for telecall.
//!
//! Owns one transport-layer peer connection per session, converts local
//! media into outgoing tracks, performs the offer/answer/candidate exchange
//! over the signaling channel, and exposes the negotiated remote stream.
//! The connection state machine lives here:
//!
//! ```text
//! idle -> negotiating -> connected -> ended
//!              \              \
//!               +-> failed <--+
//! ```
//!
//! Candidates received before the remote description is applied are
//! buffered and replayed once it is set. This is the single most important
//! correctness rule of the handshake.

pub mod error;
pub mod manager;
pub mod sim;
pub mod state;
pub mod transport;

pub use error::{PeerError, Result, TransportError};
pub use manager::{PeerEvent, PeerManager};
pub use sim::{SimulatedTransport, SimulatedTransportFactory};
pub use state::ConnectionState;
pub use transport::{PeerTransport, TransportEvent, TransportFactory, TransportState};
