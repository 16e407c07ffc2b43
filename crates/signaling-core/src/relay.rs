//! In-process signaling relay.
//!
//! Mirrors the behavior the core expects from the production relay server:
//! session-scoped registration (two participants max), delivery of each
//! envelope to exactly the other participant, in-order delivery per
//! connected channel instance, and no delivery guarantee across
//! disconnects. Used by the test suite and the loopback demo so two
//! coordinators can be wired together inside one process.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::channel::{SignalingConnector, SignalingTransport};
use crate::error::{Result, SignalingError};
use crate::message::SignalEnvelope;
use crate::types::{ParticipantId, SessionId};

struct Member {
    participant: ParticipantId,
    tx: mpsc::UnboundedSender<SignalEnvelope>,
}

/// Relay state shared by every channel it hands out.
pub struct MemoryRelay {
    sessions: DashMap<SessionId, Vec<Member>>,
    /// Scripted transient failures: each pending count makes one send fail.
    inject_failures: AtomicU32,
}

impl MemoryRelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            inject_failures: AtomicU32::new(0),
        })
    }

    /// Make the next `count` sends fail with a transient delivery error.
    /// Test hook for the bounded-retry contract.
    pub fn inject_send_failures(&self, count: u32) {
        self.inject_failures.store(count, Ordering::SeqCst);
    }

    /// Number of participants currently registered in a session.
    pub fn participant_count(&self, session_id: &SessionId) -> usize {
        self.sessions.get(session_id).map(|m| m.len()).unwrap_or(0)
    }

    fn take_injected_failure(&self) -> bool {
        self.inject_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn register(
        self: &Arc<Self>,
        session_id: SessionId,
        participant: ParticipantId,
    ) -> Result<mpsc::UnboundedReceiver<SignalEnvelope>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut members = self.sessions.entry(session_id.clone()).or_default();
        if members.iter().any(|m| m.participant == participant) {
            return Err(SignalingError::AlreadyConnected {
                session: session_id.to_string(),
                participant: participant.to_string(),
            });
        }
        if members.len() >= 2 {
            return Err(SignalingError::SessionFull { session: session_id.to_string() });
        }
        info!(session = %session_id, %participant, "participant registered on relay");
        members.push(Member { participant, tx });
        Ok(rx)
    }

    fn deregister(&self, session_id: &SessionId, participant: &ParticipantId) {
        if let Some(mut members) = self.sessions.get_mut(session_id) {
            members.retain(|m| &m.participant != participant);
        }
        self.sessions.remove_if(session_id, |_, members| members.is_empty());
    }

    fn route(&self, envelope: SignalEnvelope) -> Result<()> {
        if self.take_injected_failure() {
            return Err(SignalingError::delivery(1));
        }
        let members = self
            .sessions
            .get(&envelope.session_id)
            .ok_or(SignalingError::NotConnected)?;
        for member in members.iter().filter(|m| m.participant != envelope.sender) {
            // Fire-and-forget: a receiver torn down mid-delivery is loss
            // the caller already tolerates.
            let _ = member.tx.send(envelope.clone());
        }
        debug!(
            session = %envelope.session_id,
            kind = envelope.message.kind(),
            "relayed signal"
        );
        Ok(())
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self {
            sessions: DashMap::new(),
            inject_failures: AtomicU32::new(0),
        }
    }
}

/// One participant's channel onto the relay.
struct MemoryChannel {
    relay: Arc<MemoryRelay>,
    session_id: SessionId,
    participant: ParticipantId,
    connected: AtomicBool,
}

#[async_trait]
impl SignalingTransport for MemoryChannel {
    async fn send(&self, envelope: SignalEnvelope) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SignalingError::NotConnected);
        }
        self.relay.route(envelope)
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.relay.deregister(&self.session_id, &self.participant);
            info!(session = %self.session_id, participant = %self.participant, "signaling channel disconnected");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// [`SignalingConnector`] backed by a shared [`MemoryRelay`].
pub struct RelayConnector {
    relay: Arc<MemoryRelay>,
}

impl RelayConnector {
    pub fn new(relay: Arc<MemoryRelay>) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl SignalingConnector for RelayConnector {
    async fn connect(
        &self,
        session_id: SessionId,
        participant: ParticipantId,
    ) -> Result<(Arc<dyn SignalingTransport>, mpsc::UnboundedReceiver<SignalEnvelope>)> {
        let rx = self.relay.register(session_id.clone(), participant.clone())?;
        let channel = Arc::new(MemoryChannel {
            relay: self.relay.clone(),
            session_id,
            participant,
            connected: AtomicBool::new(true),
        });
        Ok((channel, rx))
    }
}
