//! Loopback transport.
//!
//! A deterministic [`PeerTransport`] used by the test suite and in-process
//! demos. It performs no real networking: the SDP blobs it produces carry
//! the local stream id, candidates are synthesized when a local description
//! is applied, and the pair "connects" once both descriptions are applied
//! and at least one remote candidate has been added, the same observable
//! sequence a real engine produces, pushed through the event stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use telecall_media_core::{LocalTrack, MediaStreamHandle, MediaTrackSet, StreamId};
use telecall_signaling_core::{IceCandidate, SdpDescription, SdpKind};

use crate::error::TransportError;
use crate::transport::{PeerTransport, TransportEvent, TransportFactory, TransportState};

const SDP_STREAM_ATTR: &str = "a=msid:";

fn encode_sdp(kind: SdpKind, stream: &StreamId) -> SdpDescription {
    let tag = match kind {
        SdpKind::Offer => "offer",
        SdpKind::Answer => "answer",
    };
    SdpDescription {
        kind,
        sdp: format!(
            "v=0\r\no=- {} 0 IN IP4 127.0.0.1\r\ns=telecall-sim {tag}\r\n{SDP_STREAM_ATTR}{stream}\r\n",
            uuid::Uuid::new_v4()
        ),
    }
}

fn parse_stream_id(sdp: &str) -> Option<StreamId> {
    sdp.lines()
        .find_map(|line| line.strip_prefix(SDP_STREAM_ATTR))
        .map(|id| StreamId::new(id.trim()))
}

#[derive(Default)]
struct Inner {
    local_stream: Option<StreamId>,
    tracks: Option<MediaTrackSet>,
    current_video: Option<Arc<LocalTrack>>,
    local_desc: Option<SdpDescription>,
    remote_desc: Option<SdpDescription>,
    remote_candidates: Vec<IceCandidate>,
    candidate_seq: u16,
    connected_announced: bool,
    remote_stream_announced: bool,
    closed: bool,
}

/// In-process transport with scriptable failure modes.
pub struct SimulatedTransport {
    inner: Mutex<Inner>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    reject_replace: AtomicBool,
    fail_negotiation: AtomicBool,
}

impl SimulatedTransport {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            events_tx: tx,
            events_rx: Mutex::new(Some(rx)),
            reject_replace: AtomicBool::new(false),
            fail_negotiation: AtomicBool::new(false),
        })
    }

    /// Make `replace_outgoing_video_track` reject, forcing the manager's
    /// renegotiation fallback.
    pub fn reject_replace(&self, reject: bool) {
        self.reject_replace.store(reject, Ordering::SeqCst);
    }

    /// Make the next negotiation round fail instead of connecting.
    pub fn fail_negotiation(&self) {
        self.fail_negotiation.store(true, Ordering::SeqCst);
    }

    /// Number of remote candidates actually applied. Zero discarded means
    /// this equals the number trickled by the far side.
    pub fn applied_candidate_count(&self) -> usize {
        self.inner.lock().unwrap().remote_candidates.len()
    }

    /// The outgoing video track currently attached.
    pub fn current_video_track(&self) -> Option<Arc<LocalTrack>> {
        self.inner.lock().unwrap().current_video.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    fn emit(&self, event: TransportEvent) {
        // Receiver dropped means the manager is gone; nothing to notify.
        let _ = self.events_tx.send(event);
    }

    fn trickle_local_candidates(&self, inner: &mut Inner) {
        for _ in 0..2 {
            inner.candidate_seq += 1;
            let candidate = IceCandidate {
                candidate: format!(
                    "candidate:{seq} 1 udp 2122260223 198.51.100.{seq} 4{seq:04} typ host",
                    seq = inner.candidate_seq
                ),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
            };
            self.emit(TransportEvent::LocalCandidate(candidate));
        }
    }

    fn maybe_connect(&self, inner: &mut Inner) {
        if inner.closed
            || inner.connected_announced
            || inner.local_desc.is_none()
            || inner.remote_desc.is_none()
            || inner.remote_candidates.is_empty()
        {
            return;
        }
        inner.connected_announced = true;
        if self.fail_negotiation.swap(false, Ordering::SeqCst) {
            debug!("simulated transport: scripted negotiation failure");
            self.emit(TransportEvent::StateChanged(TransportState::Failed));
            return;
        }
        self.emit(TransportEvent::StateChanged(TransportState::Connecting));
        self.emit(TransportEvent::StateChanged(TransportState::Connected));
        if !inner.remote_stream_announced {
            if let Some(stream) =
                inner.remote_desc.as_ref().and_then(|d| parse_stream_id(&d.sdp))
            {
                inner.remote_stream_announced = true;
                self.emit(TransportEvent::RemoteStream(MediaStreamHandle::new(stream)));
            }
        }
    }

    fn ensure_open(inner: &Inner) -> std::result::Result<(), TransportError> {
        if inner.closed {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PeerTransport for SimulatedTransport {
    async fn create_offer(&self) -> std::result::Result<SdpDescription, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        Self::ensure_open(&inner)?;
        let stream = inner.local_stream.clone().unwrap_or_else(StreamId::random);
        let offer = encode_sdp(SdpKind::Offer, &stream);
        inner.local_desc = Some(offer.clone());
        // A new offer starts a new negotiation round; any previously
        // applied answer is stale until the far side answers again.
        inner.connected_announced = false;
        inner.remote_desc = None;
        self.trickle_local_candidates(&mut inner);
        Ok(offer)
    }

    async fn create_answer(&self) -> std::result::Result<SdpDescription, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        Self::ensure_open(&inner)?;
        match inner.remote_desc.as_ref().map(|d| d.kind) {
            Some(SdpKind::Offer) => {}
            _ => {
                return Err(TransportError::InvalidState {
                    details: "create_answer requires a remote offer".to_string(),
                })
            }
        }
        let stream = inner.local_stream.clone().unwrap_or_else(StreamId::random);
        let answer = encode_sdp(SdpKind::Answer, &stream);
        inner.local_desc = Some(answer.clone());
        self.trickle_local_candidates(&mut inner);
        self.maybe_connect(&mut inner);
        Ok(answer)
    }

    async fn set_remote_description(
        &self,
        sdp: SdpDescription,
    ) -> std::result::Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        Self::ensure_open(&inner)?;
        if sdp.kind == SdpKind::Offer {
            // A re-offer starts a new negotiation round on this side too.
            inner.connected_announced = false;
        }
        inner.remote_desc = Some(sdp);
        self.maybe_connect(&mut inner);
        Ok(())
    }

    async fn add_remote_candidate(
        &self,
        candidate: IceCandidate,
    ) -> std::result::Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        Self::ensure_open(&inner)?;
        if inner.remote_desc.is_none() {
            return Err(TransportError::InvalidState {
                details: "remote description not set".to_string(),
            });
        }
        inner.remote_candidates.push(candidate);
        self.maybe_connect(&mut inner);
        Ok(())
    }

    async fn add_outgoing_tracks(
        &self,
        tracks: &MediaTrackSet,
    ) -> std::result::Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        Self::ensure_open(&inner)?;
        inner.local_stream = Some(tracks.stream_id.clone());
        inner.current_video = Some(tracks.video.clone());
        inner.tracks = Some(tracks.clone());
        Ok(())
    }

    async fn replace_outgoing_video_track(
        &self,
        track: Arc<LocalTrack>,
    ) -> std::result::Result<(), TransportError> {
        if self.reject_replace.load(Ordering::SeqCst) {
            return Err(TransportError::ReplaceUnsupported);
        }
        let mut inner = self.inner.lock().unwrap();
        Self::ensure_open(&inner)?;
        debug!(track = %track.id(), "outgoing video track replaced in place");
        inner.current_video = Some(track);
        Ok(())
    }

    async fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.closed {
            inner.closed = true;
            self.emit(TransportEvent::StateChanged(TransportState::Closed));
        }
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events_rx.lock().unwrap().take()
    }
}

/// Factory handing out loopback transports; keeps handles to everything it
/// created so tests can script and inspect them.
pub struct SimulatedTransportFactory {
    reject_replace: AtomicBool,
    created: Mutex<Vec<Arc<SimulatedTransport>>>,
}

impl SimulatedTransportFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            reject_replace: AtomicBool::new(false),
            created: Mutex::new(Vec::new()),
        })
    }

    /// Every transport created from now on rejects in-place replacement.
    pub fn reject_replace(&self, reject: bool) {
        self.reject_replace.store(reject, Ordering::SeqCst);
    }

    /// The most recently created transport, if any.
    pub fn last_transport(&self) -> Option<Arc<SimulatedTransport>> {
        self.created.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TransportFactory for SimulatedTransportFactory {
    async fn create_transport(
        &self,
    ) -> std::result::Result<Arc<dyn PeerTransport>, TransportError> {
        let transport = SimulatedTransport::new();
        transport.reject_replace(self.reject_replace.load(Ordering::SeqCst));
        self.created.lock().unwrap().push(transport.clone());
        Ok(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telecall_media_core::{TrackKind, TrackSource};

    fn track_set() -> MediaTrackSet {
        MediaTrackSet::new(
            LocalTrack::new(TrackKind::Audio, TrackSource::Microphone),
            LocalTrack::new(TrackKind::Video, TrackSource::Camera),
        )
    }

    #[tokio::test]
    async fn offer_carries_the_local_stream_id() {
        let transport = SimulatedTransport::new();
        let tracks = track_set();
        transport.add_outgoing_tracks(&tracks).await.unwrap();
        let offer = transport.create_offer().await.unwrap();
        assert_eq!(parse_stream_id(&offer.sdp), Some(tracks.stream_id));
    }

    #[tokio::test]
    async fn candidate_before_remote_description_is_rejected() {
        let transport = SimulatedTransport::new();
        let err = transport
            .add_remote_candidate(IceCandidate {
                candidate: "candidate:1 1 udp 1 198.51.100.1 40001 typ host".into(),
                sdp_mid: None,
                sdp_mline_index: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn connects_once_descriptions_and_a_candidate_are_applied() {
        let caller = SimulatedTransport::new();
        let callee = SimulatedTransport::new();
        caller.add_outgoing_tracks(&track_set()).await.unwrap();
        callee.add_outgoing_tracks(&track_set()).await.unwrap();
        let mut caller_events = caller.take_events().unwrap();

        let offer = caller.create_offer().await.unwrap();
        callee.set_remote_description(offer).await.unwrap();
        let answer = callee.create_answer().await.unwrap();
        caller.set_remote_description(answer).await.unwrap();
        caller
            .add_remote_candidate(IceCandidate {
                candidate: "candidate:1 1 udp 1 198.51.100.1 40001 typ host".into(),
                sdp_mid: None,
                sdp_mline_index: None,
            })
            .await
            .unwrap();

        let mut saw_connected = false;
        while let Ok(event) = caller_events.try_recv() {
            if matches!(event, TransportEvent::StateChanged(TransportState::Connected)) {
                saw_connected = true;
            }
        }
        assert!(saw_connected);
    }
}
