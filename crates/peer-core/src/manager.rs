//! Peer connection manager.
//!
//! Owns the transport and the outgoing track set for exactly one session,
//! drives the offer/answer/candidate exchange over the signaling handle,
//! and publishes state changes upward. Never shared across sessions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use telecall_media_core::{LocalTrack, MediaStreamHandle, MediaTrackSet};
use telecall_signaling_core::{IceCandidate, SdpDescription, SignalMessage, SignalingHandle};

use crate::error::{PeerError, Result, TransportError};
use crate::state::ConnectionState;
use crate::transport::{PeerTransport, TransportEvent, TransportState};

/// Notifications from the manager to its owning session.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// The connection state machine transitioned.
    StateChanged { old: ConnectionState, new: ConnectionState },

    /// The negotiated remote stream became available.
    RemoteStream(MediaStreamHandle),

    /// The handshake or transport failed; state is already `Failed`.
    NegotiationFailed { reason: String },
}

/// The connection state machine for one session.
pub struct PeerManager {
    transport: Arc<dyn PeerTransport>,
    signaling: Arc<SignalingHandle>,
    state: Mutex<ConnectionState>,
    /// Candidates that arrived before the remote description; replayed in
    /// arrival order once it is set, never dropped.
    pending_remote: Mutex<Vec<IceCandidate>>,
    remote_description_applied: AtomicBool,
    tracks: Mutex<Option<MediaTrackSet>>,
    handshake_timeout: Duration,
    timeout_task: Mutex<Option<JoinHandle<()>>>,
    pump_task: Mutex<Option<JoinHandle<()>>>,
    events_tx: mpsc::UnboundedSender<PeerEvent>,
}

impl PeerManager {
    /// Build a manager around a freshly created transport. Returns the
    /// manager and the event stream its owner drains.
    pub fn new(
        transport: Arc<dyn PeerTransport>,
        signaling: Arc<SignalingHandle>,
        handshake_timeout: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<PeerEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            transport: transport.clone(),
            signaling,
            state: Mutex::new(ConnectionState::Idle),
            pending_remote: Mutex::new(Vec::new()),
            remote_description_applied: AtomicBool::new(false),
            tracks: Mutex::new(None),
            handshake_timeout,
            timeout_task: Mutex::new(None),
            pump_task: Mutex::new(None),
            events_tx,
        });

        if let Some(transport_events) = transport.take_events() {
            let pump = tokio::spawn(Self::pump_transport_events(manager.clone(), transport_events));
            *manager.pump_task.lock().unwrap() = Some(pump);
        }

        (manager, events_rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    /// The outgoing track set, if attached.
    pub fn tracks(&self) -> Option<MediaTrackSet> {
        self.tracks.lock().unwrap().clone()
    }

    /// Attach the local outgoing tracks to the transport. Must happen
    /// before the first offer or answer.
    pub async fn attach_tracks(&self, tracks: MediaTrackSet) -> Result<()> {
        self.transport.add_outgoing_tracks(&tracks).await?;
        *self.tracks.lock().unwrap() = Some(tracks);
        Ok(())
    }

    /// Caller path: create and transmit an offer. A re-entrant call while
    /// already negotiating or connected is a no-op.
    pub async fn start_offer(self: &Arc<Self>) -> Result<()> {
        match self.state() {
            ConnectionState::Negotiating | ConnectionState::Connected => {
                debug!("start_offer ignored: call already in progress");
                return Ok(());
            }
            state if state.is_terminal() => {
                return Err(PeerError::InvalidState { operation: "start call", state });
            }
            _ => {}
        }
        if self.tracks.lock().unwrap().is_none() {
            return Err(PeerError::NoTracks);
        }

        self.set_state(ConnectionState::Negotiating);
        self.arm_handshake_timeout();

        let offer = match self.transport.create_offer().await {
            Ok(offer) => offer,
            Err(err) => return Err(self.fail_with(err.into(), "offer creation failed").await),
        };
        if let Err(err) = self.signaling.send(SignalMessage::Offer { sdp: offer }).await {
            return Err(self.fail_with(err.into(), "offer delivery failed").await);
        }
        Ok(())
    }

    /// Callee path (and renegotiation path): apply a remote offer, replay
    /// any buffered candidates, create and transmit the answer.
    pub async fn answer_offer(self: &Arc<Self>, sdp: SdpDescription) -> Result<()> {
        let state = self.state();
        if state.is_terminal() {
            return Err(PeerError::InvalidState { operation: "answer offer", state });
        }
        if self.tracks.lock().unwrap().is_none() {
            return Err(PeerError::NoTracks);
        }
        if state != ConnectionState::Connected {
            self.set_state(ConnectionState::Negotiating);
            self.arm_handshake_timeout();
        }

        if let Err(err) = self.transport.set_remote_description(sdp).await {
            return Err(self.fail_with(err.into(), "remote offer rejected").await);
        }
        self.remote_description_applied.store(true, Ordering::SeqCst);
        self.replay_buffered_candidates().await;

        let answer = match self.transport.create_answer().await {
            Ok(answer) => answer,
            Err(err) => return Err(self.fail_with(err.into(), "answer creation failed").await),
        };
        if let Err(err) = self.signaling.send(SignalMessage::Answer { sdp: answer }).await {
            return Err(self.fail_with(err.into(), "answer delivery failed").await);
        }
        Ok(())
    }

    /// Caller path: apply the remote answer and replay buffered candidates.
    pub async fn apply_answer(self: &Arc<Self>, sdp: SdpDescription) -> Result<()> {
        let state = self.state();
        if state != ConnectionState::Negotiating {
            return Err(PeerError::InvalidState { operation: "apply answer", state });
        }
        if let Err(err) = self.transport.set_remote_description(sdp).await {
            return Err(self.fail_with(err.into(), "remote answer rejected").await);
        }
        self.remote_description_applied.store(true, Ordering::SeqCst);
        self.replay_buffered_candidates().await;
        Ok(())
    }

    /// Apply or buffer one remote candidate. Candidates arriving before the
    /// remote description are queued and replayed once it is set.
    pub async fn handle_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        if self.state().is_terminal() {
            debug!("candidate ignored: session already terminal");
            return Ok(());
        }
        if self.remote_description_applied.load(Ordering::SeqCst) {
            if let Err(err) = self.transport.add_remote_candidate(candidate).await {
                warn!(%err, "remote candidate rejected by transport");
            }
        } else {
            let mut pending = self.pending_remote.lock().unwrap();
            pending.push(candidate);
            debug!(buffered = pending.len(), "candidate buffered before remote description");
        }
        Ok(())
    }

    /// Substitute the outgoing video track in one operation. If the
    /// transport rejects mid-call replacement, fall back to a full
    /// renegotiation cycle identical to initial setup.
    pub async fn replace_outgoing_video_track(
        self: &Arc<Self>,
        track: Arc<LocalTrack>,
    ) -> Result<()> {
        let state = self.state();
        if !matches!(state, ConnectionState::Connected | ConnectionState::Negotiating) {
            return Err(PeerError::InvalidState { operation: "replace video track", state });
        }

        match self.transport.replace_outgoing_video_track(track.clone()).await {
            Ok(()) => {
                self.store_video_track(track);
                Ok(())
            }
            Err(TransportError::ReplaceUnsupported) => {
                warn!("in-place replacement unsupported; renegotiating");
                self.store_video_track(track);
                self.set_state(ConnectionState::Negotiating);
                self.arm_handshake_timeout();
                let offer = match self.transport.create_offer().await {
                    Ok(offer) => offer,
                    Err(err) => {
                        return Err(self.fail_with(err.into(), "renegotiation offer failed").await)
                    }
                };
                if let Err(err) = self.signaling.send(SignalMessage::Offer { sdp: offer }).await {
                    return Err(self.fail_with(err.into(), "renegotiation delivery failed").await);
                }
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// End the connection from any state: close the transport, release the
    /// owned tracks, cancel timers. Idempotent.
    pub async fn end(&self) {
        {
            let mut slot = self.timeout_task.lock().unwrap();
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        self.transport.close().await;
        self.release_tracks();
        self.set_state(ConnectionState::Ended);
        if let Some(pump) = self.pump_task.lock().unwrap().take() {
            pump.abort();
        }
    }

    /// Synchronous teardown for drop paths: abort owned tasks, release
    /// tracks, mark ended. The transport is released when dropped.
    pub fn shutdown_sync(&self) {
        if let Some(handle) = self.timeout_task.lock().unwrap().take() {
            handle.abort();
        }
        if let Some(pump) = self.pump_task.lock().unwrap().take() {
            pump.abort();
        }
        self.release_tracks();
        self.set_state(ConnectionState::Ended);
    }

    // ---- internals ----

    async fn pump_transport_events(
        manager: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::LocalCandidate(candidate) => {
                    if manager.state().is_terminal() {
                        continue;
                    }
                    // Trickle: forward the instant it surfaces.
                    if let Err(err) =
                        manager.signaling.send(SignalMessage::Candidate { candidate }).await
                    {
                        manager
                            .fail(format!("candidate delivery failed: {err}"))
                            .await;
                    }
                }
                TransportEvent::StateChanged(transport_state) => {
                    manager.on_transport_state(transport_state).await;
                }
                TransportEvent::RemoteStream(stream) => {
                    let _ = manager.events_tx.send(PeerEvent::RemoteStream(stream));
                }
            }
            if manager.state().is_terminal() {
                break;
            }
        }
    }

    async fn on_transport_state(self: &Arc<Self>, transport_state: TransportState) {
        match transport_state {
            TransportState::Connected => {
                if let Some(handle) = self.timeout_task.lock().unwrap().take() {
                    handle.abort();
                }
                self.set_state(ConnectionState::Connected);
            }
            TransportState::Failed => {
                self.fail("transport reported failure".to_string()).await;
            }
            TransportState::Disconnected => {
                self.fail("transport disconnected".to_string()).await;
            }
            TransportState::Closed => {
                // Remote-initiated close of a live call ends it; if we
                // initiated the close the state is already terminal.
                if self.state() == ConnectionState::Connected {
                    self.release_tracks();
                    self.set_state(ConnectionState::Ended);
                }
            }
            TransportState::New | TransportState::Connecting => {}
        }
    }

    fn arm_handshake_timeout(self: &Arc<Self>) {
        let manager = self.clone();
        let timeout = self.handshake_timeout;
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if manager.state() == ConnectionState::Negotiating {
                manager
                    .fail(format!("handshake timed out after {timeout:?}"))
                    .await;
            }
        });
        if let Some(previous) = self.timeout_task.lock().unwrap().replace(task) {
            previous.abort();
        }
    }

    async fn replay_buffered_candidates(&self) {
        let buffered: Vec<IceCandidate> =
            std::mem::take(&mut *self.pending_remote.lock().unwrap());
        if buffered.is_empty() {
            return;
        }
        info!(count = buffered.len(), "replaying buffered candidates");
        for candidate in buffered {
            if let Err(err) = self.transport.add_remote_candidate(candidate).await {
                warn!(%err, "buffered candidate rejected by transport");
            }
        }
    }

    fn store_video_track(&self, track: Arc<LocalTrack>) {
        if let Some(tracks) = self.tracks.lock().unwrap().as_mut() {
            tracks.video = track;
        }
    }

    fn release_tracks(&self) {
        if let Some(tracks) = self.tracks.lock().unwrap().take() {
            tracks.release();
        }
    }

    /// Move to `Failed`, closing the transport and releasing every owned
    /// resource, exactly as an ended call does.
    async fn fail(&self, reason: String) {
        if self.state().is_terminal() {
            return;
        }
        // Detach rather than abort: this may run on the timeout task itself.
        self.timeout_task.lock().unwrap().take();
        self.transport.close().await;
        self.release_tracks();
        self.set_state(ConnectionState::Failed);
        warn!(%reason, "peer connection failed");
        let _ = self.events_tx.send(PeerEvent::NegotiationFailed { reason });
    }

    async fn fail_with(&self, err: PeerError, context: &str) -> PeerError {
        self.fail(format!("{context}: {err}")).await;
        err
    }

    fn set_state(&self, new: ConnectionState) {
        let old = {
            let mut state = self.state.lock().unwrap();
            let old = *state;
            if old == new || old.is_terminal() {
                return;
            }
            *state = new;
            old
        };
        info!(%old, %new, "connection state changed");
        let _ = self.events_tx.send(PeerEvent::StateChanged { old, new });
    }
}
