//! Transport seam for signaling.
//!
//! The concrete relay (websocket handshake, auth tokens, reconnect policy)
//! is an external collaborator; the core only depends on these traits. The
//! [`SignalingHandle`] adds the bounded delivery retry required by the
//! error-handling contract: a failed send is retried a configured number of
//! times, then surfaced as [`SignalingError::Delivery`] so the session can
//! move to the failed state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{Result, SignalingError};
use crate::message::{SignalEnvelope, SignalMessage};
use crate::types::{ParticipantId, SessionId};

/// One connected, session-scoped signaling channel.
///
/// Delivery is at-most-once per channel instance; within one instance,
/// messages arrive at the receiver in send order.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Deliver one envelope to the other participant of the session.
    async fn send(&self, envelope: SignalEnvelope) -> Result<()>;

    /// Tear down the logical transport connection. Idempotent.
    async fn disconnect(&self);

    /// Whether the channel is still connected.
    fn is_connected(&self) -> bool;
}

impl std::fmt::Debug for dyn SignalingTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn SignalingTransport")
    }
}

/// Opens signaling channels. One connect per session lifecycle; a second
/// connect for the same (session, participant) pair is a caller error.
#[async_trait]
pub trait SignalingConnector: Send + Sync {
    /// Connect to a session, yielding the send side and the ordered stream
    /// of envelopes addressed to this participant.
    async fn connect(
        &self,
        session_id: SessionId,
        participant: ParticipantId,
    ) -> Result<(Arc<dyn SignalingTransport>, mpsc::UnboundedReceiver<SignalEnvelope>)>;
}

/// Send-side wrapper owned by one session: stamps outgoing messages with
/// the session/participant addressing and retries failed sends a bounded
/// number of times.
pub struct SignalingHandle {
    transport: Arc<dyn SignalingTransport>,
    session_id: SessionId,
    local: ParticipantId,
    max_retries: u32,
    retry_delay: Duration,
}

impl SignalingHandle {
    pub fn new(
        transport: Arc<dyn SignalingTransport>,
        session_id: SessionId,
        local: ParticipantId,
        max_retries: u32,
    ) -> Self {
        Self {
            transport,
            session_id,
            local,
            max_retries,
            retry_delay: Duration::from_millis(50),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn local_participant(&self) -> &ParticipantId {
        &self.local
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Send one signal, retrying transient delivery failures. After the
    /// retry budget is exhausted the error is surfaced to the caller.
    pub async fn send(&self, message: SignalMessage) -> Result<()> {
        let envelope =
            SignalEnvelope::new(self.session_id.clone(), self.local.clone(), message);
        let attempts = self.max_retries.max(1);
        let mut last_err = SignalingError::delivery(attempts);
        for attempt in 1..=attempts {
            match self.transport.send(envelope.clone()).await {
                Ok(()) => {
                    debug!(
                        session = %self.session_id,
                        kind = envelope.message.kind(),
                        "signal sent"
                    );
                    return Ok(());
                }
                // A closed channel will not recover within the retry window.
                Err(SignalingError::Closed) | Err(SignalingError::NotConnected) => {
                    return Err(SignalingError::Closed);
                }
                Err(err) => {
                    warn!(
                        session = %self.session_id,
                        kind = envelope.message.kind(),
                        attempt,
                        %err,
                        "signal send failed"
                    );
                    last_err = err;
                    if attempt < attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        match last_err {
            SignalingError::Delivery { .. } => Err(SignalingError::delivery(attempts)),
            other => Err(other),
        }
    }

    /// Disconnect the underlying transport. Idempotent.
    pub async fn disconnect(&self) {
        self.transport.disconnect().await;
    }
}
