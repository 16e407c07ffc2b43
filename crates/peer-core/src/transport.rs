//! Transport seam.
//!
//! [`PeerTransport`] abstracts the underlying RTC engine. Connection
//! establishment is an asynchronous notification from the transport, never
//! something the manager polls: implementations push [`TransportEvent`]s
//! through the receiver handed out by [`PeerTransport::take_events`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use telecall_media_core::{LocalTrack, MediaStreamHandle, MediaTrackSet};
use telecall_signaling_core::{IceCandidate, SdpDescription};

use crate::error::TransportError;

/// Transport-level connection state, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Asynchronous notifications from the transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A local network path candidate was discovered. Trickled to the
    /// remote side as soon as it surfaces.
    LocalCandidate(IceCandidate),

    /// The transport's connection state changed.
    StateChanged(TransportState),

    /// The negotiated remote stream became available.
    RemoteStream(MediaStreamHandle),
}

/// One transport-layer peer connection.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Create an offer and apply it as the local description.
    async fn create_offer(&self) -> std::result::Result<SdpDescription, TransportError>;

    /// Create an answer from the applied remote offer and apply it as the
    /// local description.
    async fn create_answer(&self) -> std::result::Result<SdpDescription, TransportError>;

    /// Apply the remote description (offer or answer).
    async fn set_remote_description(
        &self,
        sdp: SdpDescription,
    ) -> std::result::Result<(), TransportError>;

    /// Apply one remote candidate. Callers must not invoke this before the
    /// remote description is set; the manager buffers early candidates.
    async fn add_remote_candidate(
        &self,
        candidate: IceCandidate,
    ) -> std::result::Result<(), TransportError>;

    /// Attach the local outgoing tracks.
    async fn add_outgoing_tracks(
        &self,
        tracks: &MediaTrackSet,
    ) -> std::result::Result<(), TransportError>;

    /// Substitute the outgoing video track in place, without renegotiation.
    /// May fail with [`TransportError::ReplaceUnsupported`].
    async fn replace_outgoing_video_track(
        &self,
        track: Arc<LocalTrack>,
    ) -> std::result::Result<(), TransportError>;

    /// Close the connection and stop emitting events. Idempotent.
    async fn close(&self);

    /// Take the event stream. Yields `Some` exactly once.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>>;
}

/// Constructs one transport per session. Transports are explicit,
/// per-session instances owned by the session that created them, never
/// ambient singletons.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create_transport(&self) -> std::result::Result<Arc<dyn PeerTransport>, TransportError>;
}
