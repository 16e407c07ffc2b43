//! The call duration counter: counts whole seconds while connected, only
//! while connected, and freezes at hangup.

mod common;

use std::time::Duration;

use common::{connected_pair, joined_pair, wait_for, wait_for_state};
use pretty_assertions::assert_eq;
use telecall_session_core::{ConnectionState, SessionEvent};

#[tokio::test(start_paused = true)]
async fn duration_counts_seconds_while_connected() {
    let pair = joined_pair("duration-1").await;
    assert_eq!(pair.caller.coordinator.duration_secs(), 0);

    let mut pair = pair;
    pair.caller.coordinator.start_call().await.unwrap();
    wait_for_state(&mut pair.caller.events, ConnectionState::Connected).await;
    wait_for_state(&mut pair.callee.events, ConnectionState::Connected).await;

    // Five connected seconds, with headroom so the fifth tick lands
    // strictly before we read the counter.
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(pair.caller.coordinator.duration_secs(), 5);
    assert_eq!(pair.callee.coordinator.duration_secs(), 5);
}

#[tokio::test(start_paused = true)]
async fn duration_freezes_at_hangup() {
    let mut pair = connected_pair("duration-2").await;

    tokio::time::sleep(Duration::from_millis(5_100)).await;
    pair.caller.coordinator.end_call().await;
    wait_for_state(&mut pair.callee.events, ConnectionState::Ended).await;

    let caller_frozen = pair.caller.coordinator.duration_secs();
    let callee_frozen = pair.callee.coordinator.duration_secs();
    assert_eq!(caller_frozen, 5);

    // Time keeps passing; the counters do not.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(pair.caller.coordinator.duration_secs(), caller_frozen);
    assert_eq!(pair.callee.coordinator.duration_secs(), callee_frozen);
}

#[tokio::test(start_paused = true)]
async fn duration_ticks_are_published() {
    let mut pair = connected_pair("duration-3").await;

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    let event =
        wait_for(&mut pair.caller.events, |e| matches!(e, SessionEvent::DurationTick { .. }))
            .await;
    assert!(matches!(event, SessionEvent::DurationTick { seconds: 1 }));
}

#[tokio::test(start_paused = true)]
async fn duration_stays_zero_before_connection() {
    let relay = telecall_signaling_core::MemoryRelay::new();
    let ep = common::endpoint(&relay, "alice");
    ep.coordinator.join(telecall_signaling_core::SessionId::from("duration-4")).await.unwrap();
    ep.coordinator.start_call().await.unwrap();
    assert_eq!(ep.coordinator.state(), ConnectionState::Negotiating);

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(ep.coordinator.duration_secs(), 0);
}
