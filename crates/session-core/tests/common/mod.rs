//! Shared fixture: two coordinators wired back to back through an
//! in-memory relay, with simulated devices and transports on each end.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use telecall_media_core::SimulatedDevices;
use telecall_peer_core::SimulatedTransportFactory;
use telecall_session_core::{
    ConnectionState, SessionConfig, SessionCoordinator, SessionEvent, SessionEventSubscriber,
};
use telecall_signaling_core::{MemoryRelay, RelayConnector, SessionId};

pub struct Endpoint {
    pub coordinator: Arc<SessionCoordinator>,
    pub devices: Arc<SimulatedDevices>,
    pub transports: Arc<SimulatedTransportFactory>,
    pub events: SessionEventSubscriber,
}

pub struct Pair {
    pub relay: Arc<MemoryRelay>,
    pub session_id: SessionId,
    pub caller: Endpoint,
    pub callee: Endpoint,
}

pub fn endpoint(relay: &Arc<MemoryRelay>, name: &str) -> Endpoint {
    endpoint_with_timeout(relay, name, Duration::from_secs(10))
}

pub fn endpoint_with_timeout(
    relay: &Arc<MemoryRelay>,
    name: &str,
    handshake_timeout: Duration,
) -> Endpoint {
    let devices = SimulatedDevices::new();
    let transports = SimulatedTransportFactory::new();
    let coordinator = SessionCoordinator::new(
        SessionConfig::new(name)
            .with_participant_id(name)
            .with_handshake_timeout(handshake_timeout),
        Arc::new(RelayConnector::new(relay.clone())),
        devices.clone(),
        transports.clone(),
    );
    let events = coordinator.subscribe();
    Endpoint { coordinator, devices, transports, events }
}

/// Two endpoints joined to the same session, no call started yet.
pub async fn joined_pair(session: &str) -> Pair {
    let relay = MemoryRelay::new();
    let session_id = SessionId::from(session);
    let caller = endpoint(&relay, "alice");
    let callee = endpoint(&relay, "bob");
    caller.coordinator.join(session_id.clone()).await.unwrap();
    callee.coordinator.join(session_id.clone()).await.unwrap();
    Pair { relay, session_id, caller, callee }
}

/// Two endpoints with an established call between them.
pub async fn connected_pair(session: &str) -> Pair {
    let mut pair = joined_pair(session).await;
    pair.caller.coordinator.start_call().await.unwrap();
    wait_for_state(&mut pair.caller.events, ConnectionState::Connected).await;
    wait_for_state(&mut pair.callee.events, ConnectionState::Connected).await;
    pair
}

/// Drain events until the session reaches the requested state.
pub async fn wait_for_state(events: &mut SessionEventSubscriber, wanted: ConnectionState) {
    wait_for(events, |event| {
        matches!(event, SessionEvent::ConnectionStateChanged { new, .. } if *new == wanted)
    })
    .await;
}

/// Drain events until one matches, returning it.
pub async fn wait_for(
    events: &mut SessionEventSubscriber,
    mut matches: impl FnMut(&SessionEvent) -> bool,
) -> SessionEvent {
    let deadline = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            if matches(&event) {
                return event;
            }
        }
        panic!("event bus closed before the expected event");
    });
    deadline.await.expect("timed out waiting for event")
}

/// Every track set a backend handed out has been fully released.
pub async fn assert_all_released(devices: &SimulatedDevices) {
    for set in devices.issued_tracks().await {
        assert!(!set.any_live(), "track set {} still live", set.stream_id);
    }
}
