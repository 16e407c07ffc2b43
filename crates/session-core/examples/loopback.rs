//! Two coordinators talking to each other inside one process, over the
//! in-memory relay with simulated devices and transports.
//!
//! ```sh
//! RUST_LOG=info cargo run -p telecall-session-core --example loopback
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use telecall_media_core::{MediaStreamHandle, SimulatedDevices};
use telecall_peer_core::{ConnectionState, SimulatedTransportFactory};
use telecall_session_core::{
    EndReason, Result, SessionConfig, SessionCoordinator, SessionEventHandler,
};
use telecall_signaling_core::{MemoryRelay, RelayConnector, SessionId};

struct LoggingHandler {
    side: &'static str,
}

#[async_trait]
impl SessionEventHandler for LoggingHandler {
    async fn on_connection_state_changed(&self, old: ConnectionState, new: ConnectionState) {
        info!(side = self.side, %old, %new, "state");
    }

    async fn on_remote_stream_available(&self, stream: MediaStreamHandle) {
        info!(side = self.side, stream = %stream.stream_id, "remote stream");
    }

    async fn on_duration_tick(&self, seconds: u64) {
        info!(side = self.side, seconds, "in call");
    }

    async fn on_session_ended(&self, reason: EndReason) {
        info!(side = self.side, %reason, "session ended");
    }
}

fn coordinator(relay: &Arc<MemoryRelay>, name: &'static str) -> Arc<SessionCoordinator> {
    let coordinator = SessionCoordinator::new(
        SessionConfig::new(name).with_participant_id(name),
        Arc::new(RelayConnector::new(relay.clone())),
        SimulatedDevices::new(),
        SimulatedTransportFactory::new(),
    );
    coordinator.set_event_handler(Arc::new(LoggingHandler { side: name }));
    coordinator
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let relay = MemoryRelay::new();
    let session_id = SessionId::from("loopback-demo");

    let doctor = coordinator(&relay, "doctor");
    let patient = coordinator(&relay, "patient");

    doctor.join(session_id.clone()).await?;
    patient.join(session_id).await?;

    doctor.start_call().await?;
    tokio::time::sleep(Duration::from_secs(3)).await;

    info!("doctor shares their screen");
    doctor.toggle_screen_share().await?;
    tokio::time::sleep(Duration::from_secs(2)).await;
    doctor.toggle_screen_share().await?;

    info!("patient mutes their microphone");
    patient.toggle_audio().await?;
    tokio::time::sleep(Duration::from_secs(1)).await;

    info!(duration = doctor.duration_secs(), "doctor hangs up");
    doctor.end_call().await;

    // Let the hangup propagate before the process exits.
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}
