//! Bounded-retry behavior of the signaling send path.

use std::sync::Arc;

use telecall_signaling_core::{
    MemoryRelay, ParticipantId, RelayConnector, SessionId, SignalMessage, SignalingConnector,
    SignalingError, SignalingHandle,
};

async fn connected_handle(
    relay: &Arc<MemoryRelay>,
    session: &str,
    who: &str,
    retries: u32,
) -> SignalingHandle {
    let connector = RelayConnector::new(relay.clone());
    let (transport, _rx) = connector
        .connect(SessionId::from(session), ParticipantId::from(who))
        .await
        .unwrap();
    SignalingHandle::new(transport, SessionId::from(session), ParticipantId::from(who), retries)
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_within_budget() {
    let relay = MemoryRelay::new();
    let alice = connected_handle(&relay, "s1", "alice", 3).await;
    let connector = RelayConnector::new(relay.clone());
    let (_bob, mut bob_rx) = connector
        .connect(SessionId::from("s1"), ParticipantId::from("bob"))
        .await
        .unwrap();

    // Two transient failures, budget of three attempts: must succeed.
    relay.inject_send_failures(2);
    alice.send(SignalMessage::ToggleAudio { enabled: false }).await.unwrap();
    assert_eq!(
        bob_rx.recv().await.unwrap().message,
        SignalMessage::ToggleAudio { enabled: false }
    );
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_surface_delivery_error() {
    let relay = MemoryRelay::new();
    let alice = connected_handle(&relay, "s1", "alice", 3).await;

    relay.inject_send_failures(10);
    let err = alice.send(SignalMessage::End).await.unwrap_err();
    assert_eq!(err, SignalingError::Delivery { attempts: 3 });
}

#[tokio::test]
async fn send_after_disconnect_is_closed() {
    let relay = MemoryRelay::new();
    let alice = connected_handle(&relay, "s1", "alice", 3).await;
    alice.disconnect().await;
    let err = alice.send(SignalMessage::End).await.unwrap_err();
    assert_eq!(err, SignalingError::Closed);
}

#[tokio::test]
async fn per_channel_delivery_order_is_preserved() {
    let relay = MemoryRelay::new();
    let alice = connected_handle(&relay, "s1", "alice", 1).await;
    let connector = RelayConnector::new(relay.clone());
    let (_bob, mut bob_rx) = connector
        .connect(SessionId::from("s1"), ParticipantId::from("bob"))
        .await
        .unwrap();

    for enabled in [true, false, true] {
        alice.send(SignalMessage::ToggleVideo { enabled }).await.unwrap();
    }
    for expected in [true, false, true] {
        assert_eq!(
            bob_rx.recv().await.unwrap().message,
            SignalMessage::ToggleVideo { enabled: expected }
        );
    }
}
