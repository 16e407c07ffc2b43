//! Session event bus.
//!
//! Every observable change in a session is published as a [`SessionEvent`]
//! on a broadcast channel. Consumers either drain a
//! [`SessionEventSubscriber`] directly or implement [`SessionEventHandler`]
//! and let the dispatch task fan events into the trait methods. Dispatch is
//! explicit: events reach a handler only while its dispatch task runs, and
//! the task is owned (and aborted) by whoever registered the handler.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use telecall_media_core::{MediaStreamHandle, StreamId};
use telecall_peer_core::ConnectionState;
use telecall_signaling_core::ParticipantId;

use crate::error::SessionError;
use crate::types::{EndReason, MediaToggleKind, Participant};

/// Default broadcast capacity; slow subscribers past this lag and miss
/// events rather than backpressure the coordinator.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything a session can tell its observers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A participant was added to the roster.
    ParticipantJoined { participant: Participant },

    /// A participant left the session.
    ParticipantLeft { participant: ParticipantId },

    /// The session state machine transitioned.
    ConnectionStateChanged { old: ConnectionState, new: ConnectionState },

    /// Local camera/microphone tracks are acquired and ready for preview.
    LocalStreamReady { stream_id: StreamId },

    /// The remote participant's stream became available for rendering.
    RemoteStreamAvailable { stream: MediaStreamHandle },

    /// A remote participant toggled one of their media capabilities.
    RemoteMediaToggled { participant: ParticipantId, kind: MediaToggleKind, enabled: bool },

    /// Local screen sharing started or stopped.
    ScreenShareChanged { active: bool },

    /// One tick of the call duration counter, in whole seconds since the
    /// session first connected.
    DurationTick { seconds: u64 },

    /// The session reached the ended state.
    SessionEnded { reason: EndReason },

    /// A failure was surfaced. The session state says whether it was fatal.
    Error { error: SessionError },
}

impl SessionEvent {
    /// Short tag used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ParticipantJoined { .. } => "participant-joined",
            Self::ParticipantLeft { .. } => "participant-left",
            Self::ConnectionStateChanged { .. } => "state-changed",
            Self::LocalStreamReady { .. } => "local-stream-ready",
            Self::RemoteStreamAvailable { .. } => "remote-stream-available",
            Self::RemoteMediaToggled { .. } => "remote-media-toggled",
            Self::ScreenShareChanged { .. } => "screen-share-changed",
            Self::DurationTick { .. } => "duration-tick",
            Self::SessionEnded { .. } => "session-ended",
            Self::Error { .. } => "error",
        }
    }
}

/// Publish side of the session event bus.
#[derive(Clone)]
pub struct SessionEventProcessor {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEventProcessor {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> SessionEventSubscriber {
        SessionEventSubscriber { rx: self.tx.subscribe() }
    }

    /// Publish one event to every live subscriber. No subscribers is fine.
    pub fn publish(&self, event: SessionEvent) {
        debug!(kind = event.kind(), "session event");
        let _ = self.tx.send(event);
    }
}

impl Default for SessionEventProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Receive side of the session event bus.
pub struct SessionEventSubscriber {
    rx: broadcast::Receiver<SessionEvent>,
}

impl SessionEventSubscriber {
    /// Next event, or `None` once the publishing session is gone. A lagged
    /// subscriber skips the missed window and keeps receiving.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Callback-style consumption of session events. All methods default to
/// no-ops so handlers implement only what they care about.
#[async_trait]
pub trait SessionEventHandler: Send + Sync {
    async fn on_participant_joined(&self, _participant: Participant) {}
    async fn on_participant_left(&self, _participant: ParticipantId) {}
    async fn on_connection_state_changed(&self, _old: ConnectionState, _new: ConnectionState) {}
    async fn on_local_stream_ready(&self, _stream_id: StreamId) {}
    async fn on_remote_stream_available(&self, _stream: MediaStreamHandle) {}
    async fn on_remote_media_toggled(
        &self,
        _participant: ParticipantId,
        _kind: MediaToggleKind,
        _enabled: bool,
    ) {
    }
    async fn on_screen_share_changed(&self, _active: bool) {}
    async fn on_duration_tick(&self, _seconds: u64) {}
    async fn on_session_ended(&self, _reason: EndReason) {}
    async fn on_error(&self, _error: SessionError) {}
}

/// Drive a handler from a subscription until the bus closes. The returned
/// handle owns the dispatch task.
pub fn spawn_handler_dispatch(
    mut subscriber: SessionEventSubscriber,
    handler: Arc<dyn SessionEventHandler>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = subscriber.recv().await {
            dispatch(&*handler, event).await;
        }
    })
}

async fn dispatch(handler: &dyn SessionEventHandler, event: SessionEvent) {
    match event {
        SessionEvent::ParticipantJoined { participant } => {
            handler.on_participant_joined(participant).await
        }
        SessionEvent::ParticipantLeft { participant } => {
            handler.on_participant_left(participant).await
        }
        SessionEvent::ConnectionStateChanged { old, new } => {
            handler.on_connection_state_changed(old, new).await
        }
        SessionEvent::LocalStreamReady { stream_id } => {
            handler.on_local_stream_ready(stream_id).await
        }
        SessionEvent::RemoteStreamAvailable { stream } => {
            handler.on_remote_stream_available(stream).await
        }
        SessionEvent::RemoteMediaToggled { participant, kind, enabled } => {
            handler.on_remote_media_toggled(participant, kind, enabled).await
        }
        SessionEvent::ScreenShareChanged { active } => {
            handler.on_screen_share_changed(active).await
        }
        SessionEvent::DurationTick { seconds } => handler.on_duration_tick(seconds).await,
        SessionEvent::SessionEnded { reason } => handler.on_session_ended(reason).await,
        SessionEvent::Error { error } => handler.on_error(error).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let processor = SessionEventProcessor::new();
        let mut a = processor.subscribe();
        let mut b = processor.subscribe();

        processor.publish(SessionEvent::DurationTick { seconds: 1 });

        assert!(matches!(a.recv().await, Some(SessionEvent::DurationTick { seconds: 1 })));
        assert!(matches!(b.recv().await, Some(SessionEvent::DurationTick { seconds: 1 })));
    }

    #[tokio::test]
    async fn subscriber_ends_when_processor_drops() {
        let processor = SessionEventProcessor::new();
        let mut sub = processor.subscribe();
        drop(processor);
        assert!(sub.recv().await.is_none());
    }

    struct TickCounter(AtomicU64);

    #[async_trait]
    impl SessionEventHandler for TickCounter {
        async fn on_duration_tick(&self, seconds: u64) {
            self.0.store(seconds, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn handler_dispatch_routes_by_variant() {
        let processor = SessionEventProcessor::new();
        let counter = Arc::new(TickCounter(AtomicU64::new(0)));
        let task = spawn_handler_dispatch(processor.subscribe(), counter.clone());

        processor.publish(SessionEvent::DurationTick { seconds: 7 });
        // Unhandled variants fall through the default no-ops.
        processor.publish(SessionEvent::ScreenShareChanged { active: true });

        tokio::task::yield_now().await;
        drop(processor);
        let _ = task.await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 7);
    }
}
