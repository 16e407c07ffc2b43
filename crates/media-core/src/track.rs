//! Track and stream handles.
//!
//! A [`LocalTrack`] is one audio or video unit flowing to the peer. Tracks
//! are shared by handle (`Arc`) between the acquirer, the transport and the
//! coordinator; enable/stop flags are atomic so a toggle never renegotiates
//! and a stop is observable from every holder.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identifies one track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(pub String);

impl TrackId {
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one media stream (a bundle of tracks) end to end; the remote
/// side observes the same id, which is how tests assert stream identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(pub String);

impl StreamId {
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Where a track's frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackSource {
    Microphone,
    Camera,
    Screen,
}

/// One local capture track. `enabled` flips in place (mute/unmute without
/// renegotiation); `stop` releases the underlying hardware handle and is
/// permanent.
#[derive(Debug)]
pub struct LocalTrack {
    id: TrackId,
    kind: TrackKind,
    source: TrackSource,
    enabled: AtomicBool,
    live: AtomicBool,
}

impl LocalTrack {
    pub fn new(kind: TrackKind, source: TrackSource) -> Arc<Self> {
        Arc::new(Self {
            id: TrackId::random(),
            kind,
            source,
            enabled: AtomicBool::new(true),
            live: AtomicBool::new(true),
        })
    }

    pub fn id(&self) -> &TrackId {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn source(&self) -> TrackSource {
        self.source
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Flip the enabled flag, returning the new value.
    pub fn toggle_enabled(&self) -> bool {
        let new = !self.enabled.fetch_xor(true, Ordering::SeqCst);
        debug!(track = %self.id, kind = ?self.kind, enabled = new, "track toggled");
        new
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Whether the hardware handle is still held.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Stop the track and release the hardware handle. Idempotent.
    pub fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            debug!(track = %self.id, kind = ?self.kind, source = ?self.source, "track stopped");
        }
    }
}

/// The local participant's current outgoing tracks: one audio track and one
/// video track whose source is either camera or screen, never both.
#[derive(Debug, Clone)]
pub struct MediaTrackSet {
    pub stream_id: StreamId,
    pub audio: Arc<LocalTrack>,
    pub video: Arc<LocalTrack>,
}

impl MediaTrackSet {
    pub fn new(audio: Arc<LocalTrack>, video: Arc<LocalTrack>) -> Self {
        Self { stream_id: StreamId::random(), audio, video }
    }

    /// Stop every track and release the underlying hardware. Must run on
    /// every exit path, including error paths. Idempotent.
    pub fn release(&self) {
        self.audio.stop();
        self.video.stop();
    }

    /// Whether any track still holds hardware.
    pub fn any_live(&self) -> bool {
        self.audio.is_live() || self.video.is_live()
    }
}

/// Handle to a stream as observed by the far side. Equality of `stream_id`
/// across peers is the identity check used by the convergence tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStreamHandle {
    pub stream_id: StreamId,
}

impl MediaStreamHandle {
    pub fn new(stream_id: StreamId) -> Self {
        Self { stream_id }
    }
}
