//! Session coordinator.
//!
//! One coordinator owns one consultation end to end: the signaling channel,
//! the local media, the peer connection manager and the duration counter.
//! Coordinators are explicit per-session instances; nothing here is a
//! process-wide singleton, and every background task it spawns is owned by
//! the coordinator and stopped on teardown.
//!
//! Teardown is ordered and best effort: local tracks stop first (the
//! camera light must go out even if later steps fail), then the peer
//! connection closes, then signaling announces the departure and
//! disconnects, then the duration counter stops. Once ended, the
//! coordinator ignores everything except roster-pruning `leave` signals:
//! late call signals, late acquisition results, repeated `end_call`s.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use telecall_media_core::{
    LocalTrack, MediaDevices, MediaError, MediaStreamHandle, MediaTrackSet,
};
use telecall_peer_core::{
    ConnectionState, PeerError, PeerEvent, PeerManager, TransportFactory,
};
use telecall_signaling_core::{
    IceCandidate, ParticipantId, SdpDescription, SessionId, SignalEnvelope, SignalMessage,
    SignalingConnector, SignalingHandle,
};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::events::{
    spawn_handler_dispatch, SessionEvent, SessionEventHandler, SessionEventProcessor,
    SessionEventSubscriber,
};
use crate::types::{EndReason, MediaToggleKind, Participant, Session};

/// Coordinates one video consultation session.
pub struct SessionCoordinator {
    config: SessionConfig,
    local_participant: ParticipantId,
    connector: Arc<dyn SignalingConnector>,
    devices: Arc<dyn MediaDevices>,
    transports: Arc<dyn TransportFactory>,
    events: SessionEventProcessor,
    inner: Mutex<Inner>,
    duration_secs: Arc<AtomicU64>,
    duration_task: Mutex<Option<JoinHandle<()>>>,
    /// Set once on teardown; everything arriving afterwards is ignored.
    ended: AtomicBool,
}

#[derive(Default)]
struct Inner {
    state: ConnectionState,
    session: Option<Session>,
    participants: Vec<Participant>,
    signaling: Option<Arc<SignalingHandle>>,
    peer: Option<Arc<PeerManager>>,
    camera_tracks: Option<MediaTrackSet>,
    screen_track: Option<Arc<LocalTrack>>,
    remote_stream: Option<MediaStreamHandle>,
    /// Candidates that arrived before the peer manager existed (the remote
    /// side trickles them alongside its offer). Fed to the manager once it
    /// is created; the manager buffers them until the remote description.
    early_candidates: Vec<IceCandidate>,
    signal_task: Option<JoinHandle<()>>,
    peer_task: Option<JoinHandle<()>>,
    handler_task: Option<JoinHandle<()>>,
}

impl SessionCoordinator {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn SignalingConnector>,
        devices: Arc<dyn MediaDevices>,
        transports: Arc<dyn TransportFactory>,
    ) -> Arc<Self> {
        let local_participant =
            config.participant_id.clone().unwrap_or_else(ParticipantId::random);
        Arc::new(Self {
            config,
            local_participant,
            connector,
            devices,
            transports,
            events: SessionEventProcessor::new(),
            inner: Mutex::new(Inner::default()),
            duration_secs: Arc::new(AtomicU64::new(0)),
            duration_task: Mutex::new(None),
            ended: AtomicBool::new(false),
        })
    }

    // ---- observers ----

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().unwrap().state
    }

    pub fn local_participant(&self) -> &ParticipantId {
        &self.local_participant
    }

    /// Snapshot of the session record, if joined.
    pub fn session(&self) -> Option<Session> {
        self.inner.lock().unwrap().session.clone()
    }

    /// Roster snapshot, local participant included.
    pub fn participants(&self) -> Vec<Participant> {
        self.inner.lock().unwrap().participants.clone()
    }

    /// Elapsed connected time in whole seconds. Counts only while the
    /// session is connected; pauses during renegotiation, stops at end.
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs.load(Ordering::SeqCst)
    }

    /// The local outgoing camera/microphone track set, if acquired.
    pub fn local_tracks(&self) -> Option<MediaTrackSet> {
        self.inner.lock().unwrap().camera_tracks.clone()
    }

    /// The remote participant's stream, once negotiated.
    pub fn remote_stream(&self) -> Option<MediaStreamHandle> {
        self.inner.lock().unwrap().remote_stream.clone()
    }

    pub fn is_screen_sharing(&self) -> bool {
        self.inner.lock().unwrap().screen_track.is_some()
    }

    /// Whether the local microphone is currently unmuted.
    pub fn is_audio_enabled(&self) -> bool {
        self.inner
            .lock()
            .unwrap()
            .camera_tracks
            .as_ref()
            .map(|t| t.audio.is_enabled())
            .unwrap_or(false)
    }

    /// Whether the local camera is currently enabled.
    pub fn is_video_enabled(&self) -> bool {
        self.inner
            .lock()
            .unwrap()
            .camera_tracks
            .as_ref()
            .map(|t| t.video.is_enabled())
            .unwrap_or(false)
    }

    /// Subscribe to the session event bus.
    pub fn subscribe(&self) -> SessionEventSubscriber {
        self.events.subscribe()
    }

    /// Register a callback handler. Replaces any previous handler; its
    /// dispatch task is owned by the coordinator and stopped on drop.
    pub fn set_event_handler(&self, handler: Arc<dyn SessionEventHandler>) {
        let task = spawn_handler_dispatch(self.events.subscribe(), handler);
        let mut inner = self.inner.lock().unwrap();
        if let Some(previous) = inner.handler_task.replace(task) {
            previous.abort();
        }
    }

    // ---- lifecycle ----

    /// Connect to the session's signaling channel and announce ourselves.
    /// Exactly one join per coordinator lifecycle.
    pub async fn join(self: &Arc<Self>, session_id: SessionId) -> Result<()> {
        if self.ended.load(Ordering::SeqCst) {
            return Err(SessionError::InvalidState { operation: "join", state: self.state() });
        }
        if self.inner.lock().unwrap().signaling.is_some() {
            return Err(SessionError::AlreadyJoined);
        }

        let (transport, envelopes) = self
            .connector
            .connect(session_id.clone(), self.local_participant.clone())
            .await?;
        let signaling = Arc::new(SignalingHandle::new(
            transport,
            session_id.clone(),
            self.local_participant.clone(),
            self.config.signaling_send_retries,
        ));

        if let Err(err) = signaling
            .send(SignalMessage::Join {
                participant: self.local_participant.clone(),
                display_name: self.config.display_name.clone(),
            })
            .await
        {
            signaling.disconnect().await;
            return Err(err.into());
        }

        let signal_task = tokio::spawn(Self::pump_signals(Arc::downgrade(self), envelopes));

        {
            let mut inner = self.inner.lock().unwrap();
            inner.signaling = Some(signaling);
            inner.session = Some(Session::new(session_id.clone(), self.local_participant.clone()));
            inner.participants.push(Participant::new(
                self.local_participant.clone(),
                self.config.display_name.clone(),
                true,
            ));
            inner.signal_task = Some(signal_task);
        }
        info!(session = %session_id, participant = %self.local_participant, "joined session");
        Ok(())
    }

    /// Start the call as the offering side: acquire local media, create the
    /// peer connection and send the offer. Re-entrant calls while a call is
    /// in progress are no-ops.
    pub async fn start_call(self: &Arc<Self>) -> Result<()> {
        let state = {
            let inner = self.inner.lock().unwrap();
            if inner.signaling.is_none() {
                return Err(SessionError::NotJoined);
            }
            inner.state
        };
        match state {
            ConnectionState::AcquiringMedia
            | ConnectionState::Negotiating
            | ConnectionState::Connected => {
                debug!(%state, "start_call ignored: call already in progress");
                return Ok(());
            }
            ConnectionState::Ended | ConnectionState::Failed => {
                return Err(SessionError::InvalidState { operation: "start call", state });
            }
            ConnectionState::Idle => {}
        }

        let tracks = self.acquire_call_media().await?;
        let Some(tracks) = tracks else {
            // Session ended while the acquisition was pending.
            return Ok(());
        };

        let peer = self.setup_peer(tracks).await?;
        peer.start_offer().await?;
        self.note_negotiating();
        Ok(())
    }

    /// End the session from any state. Idempotent and best effort: every
    /// teardown step runs even if an earlier one fails.
    pub async fn end_call(&self) {
        self.teardown(ConnectionState::Ended, Some(EndReason::LocalHangup), true).await;
    }

    // ---- in-call controls ----

    /// Mute or unmute the microphone in place. Returns the new enabled
    /// state. Never renegotiates.
    pub async fn toggle_audio(&self) -> Result<bool> {
        let (signaling, tracks) = self.call_handles("toggle audio")?;
        let enabled = tracks.audio.toggle_enabled();
        self.update_local_participant(|p| p.audio_enabled = enabled);
        self.send_or_fail(&signaling, SignalMessage::ToggleAudio { enabled }).await?;
        Ok(enabled)
    }

    /// Enable or disable the camera in place. Returns the new enabled
    /// state. Never renegotiates.
    pub async fn toggle_video(&self) -> Result<bool> {
        let (signaling, tracks) = self.call_handles("toggle video")?;
        let enabled = tracks.video.toggle_enabled();
        self.update_local_participant(|p| p.video_enabled = enabled);
        self.send_or_fail(&signaling, SignalMessage::ToggleVideo { enabled }).await?;
        Ok(enabled)
    }

    /// Start or stop screen sharing. Starting swaps the outgoing video to a
    /// screen-capture track; stopping restores the original camera track
    /// and releases the screen capture. A dismissed screen picker leaves
    /// the session untouched and returns `Ok(false)`.
    pub async fn toggle_screen_share(self: &Arc<Self>) -> Result<bool> {
        let (state, peer, signaling, screen, camera) = {
            let inner = self.inner.lock().unwrap();
            (
                inner.state,
                inner.peer.clone(),
                inner.signaling.clone(),
                inner.screen_track.clone(),
                inner.camera_tracks.clone(),
            )
        };
        if state != ConnectionState::Connected {
            return Err(SessionError::InvalidState { operation: "toggle screen share", state });
        }
        let (Some(peer), Some(signaling), Some(camera)) = (peer, signaling, camera) else {
            return Err(SessionError::InvalidState { operation: "toggle screen share", state });
        };

        match screen {
            None => {
                let screen = match self.devices.acquire_screen().await {
                    Ok(track) => track,
                    Err(MediaError::ScreenShareCancelled) => {
                        debug!("screen picker dismissed; session unchanged");
                        return Ok(false);
                    }
                    Err(err) => {
                        self.events.publish(SessionEvent::Error { error: err.clone().into() });
                        return Err(err.into());
                    }
                };
                if self.ended.load(Ordering::SeqCst) {
                    screen.stop();
                    debug!("screen capture discarded: session ended during acquisition");
                    return Ok(false);
                }
                if let Err(err) = peer.replace_outgoing_video_track(screen.clone()).await {
                    screen.stop();
                    return Err(err.into());
                }
                self.inner.lock().unwrap().screen_track = Some(screen);
                self.update_local_participant(|p| p.screen_sharing = true);
                self.send_or_fail(&signaling, SignalMessage::ToggleScreen { active: true })
                    .await?;
                self.events.publish(SessionEvent::ScreenShareChanged { active: true });
                info!("screen sharing started");
                Ok(true)
            }
            Some(screen) => {
                peer.replace_outgoing_video_track(camera.video.clone()).await?;
                screen.stop();
                self.inner.lock().unwrap().screen_track = None;
                self.update_local_participant(|p| p.screen_sharing = false);
                self.send_or_fail(&signaling, SignalMessage::ToggleScreen { active: false })
                    .await?;
                self.events.publish(SessionEvent::ScreenShareChanged { active: false });
                info!("screen sharing stopped, camera restored");
                Ok(false)
            }
        }
    }

    // ---- signaling intake ----

    async fn pump_signals(
        coordinator: Weak<Self>,
        mut envelopes: mpsc::UnboundedReceiver<SignalEnvelope>,
    ) {
        while let Some(envelope) = envelopes.recv().await {
            let Some(coordinator) = coordinator.upgrade() else { break };
            coordinator.handle_signal(envelope).await;
        }
    }

    async fn handle_signal(self: &Arc<Self>, envelope: SignalEnvelope) {
        if self.ended.load(Ordering::SeqCst) {
            // Roster bookkeeping outlives the call; everything else is
            // dropped once the session has ended.
            if let SignalMessage::Leave { participant } = envelope.message {
                self.remove_participant(&participant);
            } else {
                debug!(kind = envelope.message.kind(), "signal ignored: session ended");
            }
            return;
        }
        let sender = envelope.sender;
        match envelope.message {
            SignalMessage::Join { participant, display_name } => {
                self.on_remote_join(participant, display_name).await;
            }
            SignalMessage::Leave { participant } => {
                let in_call = self.inner.lock().unwrap().peer.is_some();
                self.remove_participant(&participant);
                if in_call {
                    self.teardown(ConnectionState::Ended, Some(EndReason::RemoteLeft), false)
                        .await;
                }
            }
            SignalMessage::Offer { sdp } => {
                self.on_remote_offer(sdp).await;
            }
            SignalMessage::Answer { sdp } => {
                let peer = self.inner.lock().unwrap().peer.clone();
                match peer {
                    Some(peer) => {
                        if let Err(err) = peer.apply_answer(sdp).await {
                            warn!(%err, "remote answer rejected");
                        }
                    }
                    None => warn!("answer received with no call in progress"),
                }
            }
            SignalMessage::Candidate { candidate } => {
                let peer = self.inner.lock().unwrap().peer.clone();
                match peer {
                    Some(peer) => {
                        let _ = peer.handle_remote_candidate(candidate).await;
                    }
                    None => {
                        // Trickled ahead of the offer; held until the peer
                        // manager exists.
                        self.inner.lock().unwrap().early_candidates.push(candidate);
                    }
                }
            }
            SignalMessage::ToggleAudio { enabled } => {
                self.on_remote_toggle(sender, MediaToggleKind::Audio, enabled);
            }
            SignalMessage::ToggleVideo { enabled } => {
                self.on_remote_toggle(sender, MediaToggleKind::Video, enabled);
            }
            SignalMessage::ToggleScreen { active } => {
                self.on_remote_toggle(sender, MediaToggleKind::Screen, active);
            }
            SignalMessage::End => {
                info!("remote participant ended the call");
                self.teardown(ConnectionState::Ended, Some(EndReason::RemoteHangup), false)
                    .await;
            }
        }
    }

    async fn on_remote_join(&self, participant: ParticipantId, display_name: String) {
        let (added, signaling) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.participants.iter().any(|p| p.id == participant) {
                (None, None)
            } else {
                let entry = Participant::new(participant.clone(), display_name, false);
                inner.participants.push(entry.clone());
                (Some(entry), inner.signaling.clone())
            }
        };
        let Some(entry) = added else { return };
        info!(participant = %entry.id, "participant joined");
        // Announce ourselves back so a later joiner learns the roster. The
        // echo terminates because known participants are not re-added.
        if let Some(signaling) = signaling {
            if let Err(err) = signaling
                .send(SignalMessage::Join {
                    participant: self.local_participant.clone(),
                    display_name: self.config.display_name.clone(),
                })
                .await
            {
                debug!(%err, "roster echo not delivered");
            }
        }
        self.events.publish(SessionEvent::ParticipantJoined { participant: entry });
    }

    fn remove_participant(&self, participant: &ParticipantId) {
        let removed = {
            let mut inner = self.inner.lock().unwrap();
            let before = inner.participants.len();
            inner.participants.retain(|p| &p.id != participant);
            inner.participants.len() != before
        };
        if removed {
            info!(%participant, "participant left");
            self.events
                .publish(SessionEvent::ParticipantLeft { participant: participant.clone() });
        }
    }

    fn on_remote_toggle(&self, sender: ParticipantId, kind: MediaToggleKind, enabled: bool) {
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(p) =
                inner.participants.iter_mut().find(|p| p.id == sender && !p.is_local)
            {
                match kind {
                    MediaToggleKind::Audio => p.audio_enabled = enabled,
                    MediaToggleKind::Video => p.video_enabled = enabled,
                    MediaToggleKind::Screen => p.screen_sharing = enabled,
                }
            }
        }
        self.events.publish(SessionEvent::RemoteMediaToggled {
            participant: sender,
            kind,
            enabled,
        });
    }

    /// Callee path: a remote offer arrived. With no call in progress this
    /// acquires media and answers; with one in progress it is the remote
    /// side renegotiating (a track swap) and goes straight to the manager.
    async fn on_remote_offer(self: &Arc<Self>, sdp: SdpDescription) {
        let peer = self.inner.lock().unwrap().peer.clone();
        if let Some(peer) = peer {
            if let Err(err) = peer.answer_offer(sdp).await {
                warn!(%err, "renegotiation offer rejected");
            }
            return;
        }

        info!("incoming call offer; acquiring local media");
        let tracks = match self.acquire_call_media().await {
            Ok(Some(tracks)) => tracks,
            Ok(None) => return,
            Err(_) => return, // surfaced as an Error event already
        };
        let peer = match self.setup_peer(tracks).await {
            Ok(peer) => peer,
            Err(_) => return,
        };
        match peer.answer_offer(sdp).await {
            Ok(()) => self.note_negotiating(),
            Err(err) => warn!(%err, "could not answer incoming offer"),
        }
    }

    // ---- call plumbing ----

    /// Acquire camera and microphone for a call. `Ok(None)` means the
    /// session ended while the request was pending and the late result was
    /// discarded (tracks stopped). Acquisition failure returns the session
    /// to idle; the caller may retry.
    async fn acquire_call_media(&self) -> Result<Option<MediaTrackSet>> {
        self.set_state(ConnectionState::AcquiringMedia);
        let tracks = match self
            .devices
            .acquire_camera_and_microphone(self.config.constraints.clone())
            .await
        {
            Ok(tracks) => tracks,
            Err(err) => {
                warn!(%err, "media acquisition failed");
                self.events.publish(SessionEvent::Error { error: err.clone().into() });
                self.set_state(ConnectionState::Idle);
                return Err(err.into());
            }
        };
        if self.ended.load(Ordering::SeqCst) {
            debug!("acquisition result discarded: session ended while pending");
            tracks.release();
            return Ok(None);
        }
        {
            let mut inner = self.inner.lock().unwrap();
            inner.camera_tracks = Some(tracks.clone());
        }
        self.events
            .publish(SessionEvent::LocalStreamReady { stream_id: tracks.stream_id.clone() });
        Ok(Some(tracks))
    }

    /// Create the transport and peer manager for this call, attach the
    /// outgoing tracks and flush candidates that arrived early.
    async fn setup_peer(self: &Arc<Self>, tracks: MediaTrackSet) -> Result<Arc<PeerManager>> {
        let signaling =
            self.inner.lock().unwrap().signaling.clone().ok_or(SessionError::NotJoined)?;

        let transport = match self.transports.create_transport().await {
            Ok(transport) => transport,
            Err(err) => {
                let error: SessionError = err.into();
                self.events.publish(SessionEvent::Error { error: error.clone() });
                self.teardown(ConnectionState::Failed, None, false).await;
                return Err(error);
            }
        };

        let (peer, peer_events) =
            PeerManager::new(transport, signaling, self.config.handshake_timeout);
        if let Err(err) = peer.attach_tracks(tracks).await {
            let error: SessionError = err.into();
            self.events.publish(SessionEvent::Error { error: error.clone() });
            self.teardown(ConnectionState::Failed, None, false).await;
            return Err(error);
        }

        let early = {
            let mut inner = self.inner.lock().unwrap();
            inner.peer = Some(peer.clone());
            std::mem::take(&mut inner.early_candidates)
        };
        for candidate in early {
            let _ = peer.handle_remote_candidate(candidate).await;
        }

        let task = tokio::spawn(Self::pump_peer_events(Arc::downgrade(self), peer_events));
        self.inner.lock().unwrap().peer_task = Some(task);
        Ok(peer)
    }

    async fn pump_peer_events(
        coordinator: Weak<Self>,
        mut events: mpsc::UnboundedReceiver<PeerEvent>,
    ) {
        while let Some(event) = events.recv().await {
            let Some(coordinator) = coordinator.upgrade() else { break };
            match event {
                PeerEvent::StateChanged { new, .. } => match new {
                    ConnectionState::Ended => {
                        coordinator
                            .teardown(
                                ConnectionState::Ended,
                                Some(EndReason::RemoteHangup),
                                false,
                            )
                            .await;
                    }
                    ConnectionState::Failed => {
                        coordinator.teardown(ConnectionState::Failed, None, false).await;
                    }
                    other => coordinator.set_state(other),
                },
                PeerEvent::RemoteStream(stream) => {
                    coordinator.inner.lock().unwrap().remote_stream = Some(stream.clone());
                    coordinator.events.publish(SessionEvent::RemoteStreamAvailable { stream });
                }
                PeerEvent::NegotiationFailed { reason } => {
                    coordinator.events.publish(SessionEvent::Error {
                        error: PeerError::Negotiation { reason }.into(),
                    });
                }
            }
        }
    }

    /// Common teardown for every exit: local hangup, remote hangup, remote
    /// leave and failure. First call wins; later calls are no-ops.
    async fn teardown(
        &self,
        end_state: ConnectionState,
        reason: Option<EndReason>,
        notify_remote: bool,
    ) {
        if self.ended.swap(true, Ordering::SeqCst) {
            debug!("teardown ignored: session already ended");
            return;
        }
        let (peer, signaling, camera, screen) = {
            let mut inner = self.inner.lock().unwrap();
            (
                inner.peer.take(),
                inner.signaling.take(),
                inner.camera_tracks.take(),
                inner.screen_track.take(),
            )
        };

        // Local hardware first: the camera light must go out no matter
        // what the network layers do next.
        if let Some(camera) = camera {
            camera.release();
        }
        if let Some(screen) = screen {
            screen.stop();
        }
        if let Some(peer) = peer {
            peer.end().await;
        }
        if let Some(signaling) = signaling {
            if notify_remote {
                if let Err(err) = signaling.send(SignalMessage::End).await {
                    debug!(%err, "end signal not delivered");
                }
            }
            // Announce departure so the far side prunes its roster even
            // when the end signal was lost.
            if let Err(err) = signaling
                .send(SignalMessage::Leave { participant: self.local_participant.clone() })
                .await
            {
                debug!(%err, "leave signal not delivered");
            }
            signaling.disconnect().await;
        }
        self.stop_duration();
        self.set_state(end_state);
        if let Some(reason) = reason {
            info!(%reason, "session ended");
            self.events.publish(SessionEvent::SessionEnded { reason });
        }
    }

    // ---- shared internals ----

    /// Handles needed by the in-call toggles, or the right typed error.
    fn call_handles(
        &self,
        operation: &'static str,
    ) -> Result<(Arc<SignalingHandle>, MediaTrackSet)> {
        let inner = self.inner.lock().unwrap();
        let signaling = inner.signaling.clone().ok_or(SessionError::NotJoined)?;
        let tracks = inner
            .camera_tracks
            .clone()
            .ok_or(SessionError::InvalidState { operation, state: inner.state })?;
        Ok((signaling, tracks))
    }

    /// Send one signal; on exhausted delivery retries the session moves to
    /// failed with full release, per the delivery contract.
    async fn send_or_fail(
        &self,
        signaling: &SignalingHandle,
        message: SignalMessage,
    ) -> Result<()> {
        if let Err(err) = signaling.send(message).await {
            let error: SessionError = err.into();
            warn!(%error, "signal delivery exhausted retries");
            self.events.publish(SessionEvent::Error { error: error.clone() });
            self.teardown(ConnectionState::Failed, None, false).await;
            return Err(error);
        }
        Ok(())
    }

    fn update_local_participant(&self, apply: impl FnOnce(&mut Participant)) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(p) = inner.participants.iter_mut().find(|p| p.is_local) {
            apply(p);
        }
    }

    /// Record that negotiation started, unless the handshake has already
    /// advanced past it (a fully in-process exchange can connect before the
    /// offer call even returns).
    fn note_negotiating(&self) {
        let old = {
            let mut inner = self.inner.lock().unwrap();
            if !matches!(
                inner.state,
                ConnectionState::Idle | ConnectionState::AcquiringMedia
            ) {
                return;
            }
            let old = inner.state;
            inner.state = ConnectionState::Negotiating;
            if let Some(session) = inner.session.as_mut() {
                session.state = ConnectionState::Negotiating;
            }
            old
        };
        info!(%old, new = %ConnectionState::Negotiating, "session state changed");
        self.events.publish(SessionEvent::ConnectionStateChanged {
            old,
            new: ConnectionState::Negotiating,
        });
    }

    fn set_state(&self, new: ConnectionState) {
        let old = {
            let mut inner = self.inner.lock().unwrap();
            let old = inner.state;
            // Ended is absorbing; no transition leaves it.
            if old == new || old == ConnectionState::Ended {
                return;
            }
            inner.state = new;
            if let Some(session) = inner.session.as_mut() {
                session.state = new;
                if new == ConnectionState::Connected && session.connected_at.is_none() {
                    session.connected_at = Some(chrono::Utc::now());
                }
                if new.is_terminal() {
                    session.ended_at = Some(chrono::Utc::now());
                }
            }
            old
        };
        if new == ConnectionState::Connected {
            self.start_duration();
        } else if old == ConnectionState::Connected {
            self.stop_duration();
        }
        info!(%old, %new, "session state changed");
        self.events.publish(SessionEvent::ConnectionStateChanged { old, new });
    }

    /// Start the duration counter. The count accumulates across
    /// renegotiation pauses; it is never reset within one session.
    fn start_duration(&self) {
        let counter = self.duration_secs.clone();
        let events = self.events.clone();
        let period = self.config.duration_tick;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick of an interval is immediate.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let seconds = counter.fetch_add(1, Ordering::SeqCst) + 1;
                events.publish(SessionEvent::DurationTick { seconds });
            }
        });
        if let Some(previous) = self.duration_task.lock().unwrap().replace(task) {
            previous.abort();
        }
    }

    fn stop_duration(&self) {
        if let Some(task) = self.duration_task.lock().unwrap().take() {
            task.abort();
        }
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        // Synchronous last-resort release for coordinators dropped without
        // an explicit end_call.
        if let Some(task) = self.duration_task.get_mut().ok().and_then(|t| t.take()) {
            task.abort();
        }
        if let Ok(inner) = self.inner.get_mut() {
            for task in [
                inner.signal_task.take(),
                inner.peer_task.take(),
                inner.handler_task.take(),
            ]
            .into_iter()
            .flatten()
            {
                task.abort();
            }
            if let Some(camera) = inner.camera_tracks.take() {
                camera.release();
            }
            if let Some(screen) = inner.screen_track.take() {
                screen.stop();
            }
            if let Some(peer) = inner.peer.take() {
                peer.shutdown_sync();
            }
        }
    }
}
