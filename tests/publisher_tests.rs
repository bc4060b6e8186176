// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live-location publisher tests: throttling thresholds and the
//! sharing lifecycle against the in-memory store.

mod common;

use common::{create_test_app, seed_user};
use pairtrack::services::{Coordinates, ShareState};
use std::time::Duration;

#[tokio::test]
async fn test_share_start_publishes_and_stop_clears_flag() {
    let (_, state, store, source) = create_test_app();
    let alice = seed_user(&state, &store, "alice").await;

    state.publisher.start(&alice).await.unwrap();
    assert_eq!(state.publisher.state("alice"), ShareState::Active);

    source.push("alice", Coordinates { lat: 37.0, lng: -122.0 });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let doc = store.raw("alice").unwrap();
    assert!(doc.sharing_enabled);
    assert_eq!(doc.location.unwrap().lat, 37.0);

    state.publisher.stop(&alice).await.unwrap();
    let doc = store.raw("alice").unwrap();
    assert!(!doc.sharing_enabled);
    // The last sample stays behind for "last seen" display.
    assert!(doc.location.is_some());
}

#[tokio::test]
async fn test_publisher_suppresses_stationary_samples() {
    let (_, state, store, source) = create_test_app();
    let alice = seed_user(&state, &store, "alice").await;
    state.publisher.start(&alice).await.unwrap();

    let origin = Coordinates { lat: 37.0, lng: -122.0 };
    source.push("alice", origin);
    tokio::time::sleep(Duration::from_millis(30)).await;
    let first = store.raw("alice").unwrap().location.unwrap();

    // ~1 m away, inside both the interval and the distance threshold:
    // the stored sample must not change.
    source.push("alice", Coordinates { lat: 37.000009, lng: -122.0 });
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = store.raw("alice").unwrap().location.unwrap();
    assert_eq!(second.lat, first.lat);

    // ~100 m away crosses the distance threshold immediately.
    source.push("alice", Coordinates { lat: 37.0009, lng: -122.0 });
    tokio::time::sleep(Duration::from_millis(30)).await;
    let third = store.raw("alice").unwrap().location.unwrap();
    assert!(third.lat > 37.0005);
}

#[tokio::test]
async fn test_publish_survives_transient_write_failure() {
    let (_, state, store, source) = create_test_app();
    let alice = seed_user(&state, &store, "alice").await;
    state.publisher.start(&alice).await.unwrap();

    // Writes fail while the store rejects them; samples are dropped.
    store.deny_writes("alice");
    source.push("alice", Coordinates { lat: 10.0, lng: 10.0 });
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(store.raw("alice").unwrap().location.is_none());

    // The loop is still running; the next sample lands.
    store.allow_writes("alice");
    tokio::time::sleep(Duration::from_millis(60)).await;
    source.push("alice", Coordinates { lat: 11.0, lng: 11.0 });
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(store.raw("alice").unwrap().location.unwrap().lat, 11.0);
}
