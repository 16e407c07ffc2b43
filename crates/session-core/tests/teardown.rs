//! `end_call` is valid from every state, idempotent, and always leaves the
//! session fully released: zero live tracks, signaling disconnected, timers
//! stopped.

mod common;

use std::time::Duration;

use common::{assert_all_released, connected_pair, endpoint, joined_pair};
use pretty_assertions::assert_eq;
use telecall_session_core::{ConnectionState, SessionError};
use telecall_signaling_core::{MemoryRelay, SessionId};

#[tokio::test]
async fn end_from_idle_disconnects_signaling() {
    let relay = MemoryRelay::new();
    let session_id = SessionId::from("teardown-1");
    let ep = endpoint(&relay, "alice");
    ep.coordinator.join(session_id.clone()).await.unwrap();
    assert_eq!(relay.participant_count(&session_id), 1);

    ep.coordinator.end_call().await;

    assert_eq!(ep.coordinator.state(), ConnectionState::Ended);
    assert_eq!(relay.participant_count(&session_id), 0);
}

#[tokio::test(start_paused = true)]
async fn end_during_pending_acquisition_discards_the_late_result() {
    let relay = MemoryRelay::new();
    let session_id = SessionId::from("teardown-2");
    let ep = endpoint(&relay, "alice");
    ep.coordinator.join(session_id).await.unwrap();

    // The permission prompt hangs for five seconds.
    ep.devices.delay_next_acquisition(Duration::from_secs(5)).await;
    let coordinator = ep.coordinator.clone();
    let pending = tokio::spawn(async move { coordinator.start_call().await });

    // Let the call reach the acquisition await, then hang up under it.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(ep.coordinator.state(), ConnectionState::AcquiringMedia);
    ep.coordinator.end_call().await;
    assert_eq!(ep.coordinator.state(), ConnectionState::Ended);

    // The acquisition resolves later; its result must be discarded and the
    // tracks it produced stopped.
    tokio::time::sleep(Duration::from_secs(10)).await;
    pending.await.unwrap().unwrap();
    assert_eq!(ep.devices.issued_tracks().await.len(), 1);
    assert_all_released(&ep.devices).await;
    assert!(ep.coordinator.local_tracks().is_none());
}

#[tokio::test]
async fn end_while_negotiating_releases_everything() {
    // No remote participant ever answers, so the call stays negotiating.
    let relay = MemoryRelay::new();
    let session_id = SessionId::from("teardown-3");
    let ep = endpoint(&relay, "alice");
    ep.coordinator.join(session_id.clone()).await.unwrap();
    ep.coordinator.start_call().await.unwrap();
    assert_eq!(ep.coordinator.state(), ConnectionState::Negotiating);

    ep.coordinator.end_call().await;

    assert_eq!(ep.coordinator.state(), ConnectionState::Ended);
    assert_all_released(&ep.devices).await;
    assert!(ep.transports.last_transport().unwrap().is_closed());
    assert_eq!(relay.participant_count(&session_id), 0);
    assert_eq!(ep.coordinator.duration_secs(), 0);
}

#[tokio::test]
async fn end_while_connected_releases_everything() {
    let pair = connected_pair("teardown-4").await;

    pair.caller.coordinator.end_call().await;

    assert_eq!(pair.caller.coordinator.state(), ConnectionState::Ended);
    assert_all_released(&pair.caller.devices).await;
    assert!(pair.caller.transports.last_transport().unwrap().is_closed());
    assert_eq!(pair.relay.participant_count(&pair.session_id), 1, "only the callee remains");
}

#[tokio::test]
async fn end_call_is_idempotent() {
    let pair = connected_pair("teardown-5").await;

    pair.caller.coordinator.end_call().await;
    pair.caller.coordinator.end_call().await;
    pair.caller.coordinator.end_call().await;

    assert_eq!(pair.caller.coordinator.state(), ConnectionState::Ended);
}

#[tokio::test]
async fn signals_after_end_are_ignored() {
    let pair = joined_pair("teardown-6").await;

    pair.caller.coordinator.end_call().await;
    // The callee starts a call; its offer reaches a coordinator that has
    // already ended and must be dropped on the floor. Depending on
    // scheduling the callee may itself have processed the caller's end
    // signal first, in which case the start is rejected instead.
    match pair.callee.coordinator.start_call().await {
        Ok(()) | Err(SessionError::InvalidState { .. }) => {}
        Err(err) => panic!("unexpected start_call error: {err}"),
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(pair.caller.coordinator.state(), ConnectionState::Ended);
    assert!(pair.caller.coordinator.local_tracks().is_none());
}
