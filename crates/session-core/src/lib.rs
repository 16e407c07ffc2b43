//! Session coordination for telecall.
//!
//! The [`SessionCoordinator`] is the public surface of the negotiation
//! core: join a session, start or receive a call, toggle microphone,
//! camera and screen sharing, watch the event bus, end the call. It
//! composes the three lower layers (signaling, media, peer) and owns their
//! lifecycles; one coordinator per consultation, created and dropped with
//! it.
//!
//! ```no_run
//! use std::sync::Arc;
//! use telecall_media_core::SimulatedDevices;
//! use telecall_peer_core::SimulatedTransportFactory;
//! use telecall_session_core::{SessionConfig, SessionCoordinator};
//! use telecall_signaling_core::{MemoryRelay, RelayConnector, SessionId};
//!
//! # async fn run() -> telecall_session_core::Result<()> {
//! let relay = MemoryRelay::new();
//! let coordinator = SessionCoordinator::new(
//!     SessionConfig::new("Dr. Lee"),
//!     Arc::new(RelayConnector::new(relay)),
//!     SimulatedDevices::new(),
//!     SimulatedTransportFactory::new(),
//! );
//! coordinator.join(SessionId::from("consult-42")).await?;
//! coordinator.start_call().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod types;

pub use config::SessionConfig;
pub use coordinator::SessionCoordinator;
pub use error::{Result, SessionError};
pub use events::{
    spawn_handler_dispatch, SessionEvent, SessionEventHandler, SessionEventProcessor,
    SessionEventSubscriber,
};
pub use types::{EndReason, MediaToggleKind, Participant, Session};

// The state machine is shared vocabulary with the peer layer.
pub use telecall_peer_core::ConnectionState;
