//! Shared fixture: one peer manager wired to an in-memory relay, with the
//! far side's receiver exposed so tests can observe outgoing signals.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use telecall_media_core::{LocalTrack, MediaTrackSet, TrackKind, TrackSource};
use telecall_peer_core::{
    ConnectionState, PeerEvent, PeerManager, PeerTransport, SimulatedTransport,
};
use telecall_signaling_core::{
    MemoryRelay, ParticipantId, RelayConnector, SdpDescription, SessionId, SignalEnvelope,
    SignalingConnector, SignalingHandle,
};

pub struct PeerFixture {
    pub relay: Arc<MemoryRelay>,
    pub transport: Arc<SimulatedTransport>,
    pub manager: Arc<PeerManager>,
    pub events: mpsc::UnboundedReceiver<PeerEvent>,
    /// Envelopes the far side receives from this manager.
    pub remote_rx: mpsc::UnboundedReceiver<SignalEnvelope>,
}

pub fn camera_track_set() -> MediaTrackSet {
    MediaTrackSet::new(
        LocalTrack::new(TrackKind::Audio, TrackSource::Microphone),
        LocalTrack::new(TrackKind::Video, TrackSource::Camera),
    )
}

pub fn remote_offer(stream: &str) -> SdpDescription {
    SdpDescription::offer(format!("v=0\r\na=msid:{stream}\r\n"))
}

pub fn remote_answer(stream: &str) -> SdpDescription {
    SdpDescription::answer(format!("v=0\r\na=msid:{stream}\r\n"))
}

pub async fn peer_fixture(handshake_timeout: Duration) -> PeerFixture {
    let relay = MemoryRelay::new();
    let connector = RelayConnector::new(relay.clone());
    let (channel, _local_rx) = connector
        .connect(SessionId::from("s1"), ParticipantId::from("local"))
        .await
        .unwrap();
    let (_remote_channel, remote_rx) = connector
        .connect(SessionId::from("s1"), ParticipantId::from("remote"))
        .await
        .unwrap();

    let signaling = Arc::new(SignalingHandle::new(
        channel,
        SessionId::from("s1"),
        ParticipantId::from("local"),
        3,
    ));
    let transport = SimulatedTransport::new();
    let (manager, events) =
        PeerManager::new(transport.clone() as Arc<dyn PeerTransport>, signaling, handshake_timeout);
    manager.attach_tracks(camera_track_set()).await.unwrap();

    PeerFixture { relay, transport, manager, events, remote_rx }
}

/// Drain peer events until the requested state is observed.
pub async fn wait_for_state(
    events: &mut mpsc::UnboundedReceiver<PeerEvent>,
    wanted: ConnectionState,
) {
    let deadline = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            if let PeerEvent::StateChanged { new, .. } = event {
                if new == wanted {
                    return;
                }
            }
        }
        panic!("event stream closed before reaching {wanted}");
    });
    deadline.await.unwrap_or_else(|_| panic!("timed out waiting for state {wanted}"));
}
