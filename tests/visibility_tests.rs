// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Visibility reconciliation tests: what a viewer's tracker shows as
//! documents change underneath it.

mod common;

use common::{create_test_app, seed_user};
use pairtrack::models::{GeoSample, ProfilePatch};
use pairtrack::store::ProfileStore;
use std::time::Duration;

#[tokio::test]
async fn test_links_view_tracks_sharing_flag() {
    let (_, state, store, _) = create_test_app();
    let alice = seed_user(&state, &store, "alice").await;
    let bob = seed_user(&state, &store, "bob").await;

    state.follow.propose(&alice, "bob").await.unwrap();
    state.follow.accept(&bob, "alice").await.unwrap();

    // Bob starts sharing with a location on record.
    store
        .set_merge(
            "bob",
            ProfilePatch {
                sharing_enabled: Some(true),
                location: Some(GeoSample {
                    lat: 37.0,
                    lng: -122.0,
                    last_updated: 100,
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let followed = state.follow.load_effective("alice").await.unwrap();
    state.presence.sync("alice", &followed).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snap = state.presence.tracker("alice").snapshot();
    assert_eq!(snap.len(), 1);
    assert!(snap[0].active);
    assert_eq!(snap[0].location.unwrap().lat, 37.0);

    // Bob stops sharing; the next snapshot withholds the location.
    store
        .set_merge(
            "bob",
            ProfilePatch {
                sharing_enabled: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snap = state.presence.tracker("alice").snapshot();
    assert!(!snap[0].active);
    assert!(snap[0].location.is_none());
}

#[tokio::test]
async fn test_view_requires_visibility_grant() {
    let (_, state, store, _) = create_test_app();
    seed_user(&state, &store, "alice").await;
    seed_user(&state, &store, "bob").await;

    // Bob shares, but never granted Alice visibility.
    store
        .set_merge(
            "bob",
            ProfilePatch {
                sharing_enabled: Some(true),
                location: Some(GeoSample {
                    lat: 37.0,
                    lng: -122.0,
                    last_updated: 100,
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let tracker = state.presence.tracker("alice");
    tracker.follow("bob").await.unwrap();

    let snap = tracker.snapshot();
    assert_eq!(snap.len(), 1);
    assert!(!snap[0].active);
    assert!(snap[0].location.is_none());
}

#[tokio::test]
async fn test_view_sorted_active_first_by_freshness() {
    let (_, state, store, _) = create_test_app();
    seed_user(&state, &store, "viewer").await;

    for (id, ts, sharing) in [("a", 10, true), ("b", 30, true), ("c", 20, true), ("d", 0, false)]
    {
        seed_user(&state, &store, id).await;
        let mut doc = store.raw(id).unwrap();
        doc.visible_to = vec!["viewer".to_string()];
        doc.sharing_enabled = sharing;
        if sharing {
            doc.location = Some(GeoSample {
                lat: 1.0,
                lng: 2.0,
                last_updated: ts,
            });
        }
        store.put(&doc).await.unwrap();
    }

    let tracker = state.presence.tracker("viewer");
    for id in ["a", "b", "c", "d"] {
        tracker.follow(id).await.unwrap();
    }

    let ids: Vec<String> = tracker.snapshot().into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec!["b", "c", "a", "d"]);
}

#[tokio::test]
async fn test_disconnect_removes_from_view() {
    let (_, state, store, _) = create_test_app();
    let alice = seed_user(&state, &store, "alice").await;
    let bob = seed_user(&state, &store, "bob").await;

    state.follow.propose(&alice, "bob").await.unwrap();
    state.follow.accept(&bob, "alice").await.unwrap();

    let followed = state.follow.load_effective("alice").await.unwrap();
    state.presence.sync("alice", &followed).await.unwrap();
    assert_eq!(state.presence.tracker("alice").snapshot().len(), 1);

    state.follow.disconnect(&alice, "bob").await.unwrap();
    let followed = state.follow.load_effective("alice").await.unwrap();
    state.presence.sync("alice", &followed).await.unwrap();
    assert!(state.presence.tracker("alice").snapshot().is_empty());
}
