// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shadow cache tests: union merge semantics and on-disk durability.

mod common;

use common::{create_test_app, seed_user};
use pairtrack::cache::{merge_followed, ShadowCache};
use pairtrack::store::ProfileStore;
use std::collections::BTreeSet;

fn set(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_merge_is_union() {
    let remote = vec!["c".to_string(), "d".to_string()];
    let local = set(&["b", "c"]);
    assert_eq!(merge_followed(&remote, &local), set(&["b", "c", "d"]));
}

#[test]
fn test_dir_backing_survives_reopen() {
    let dir = std::env::temp_dir().join(format!("pairtrack-cache-{}", std::process::id()));
    let cache = ShadowCache::new_dir(&dir);
    cache.save("alice", &set(&["b", "c"]));

    // A fresh instance over the same directory sees the saved set.
    let reopened = ShadowCache::new_dir(&dir);
    assert_eq!(reopened.load("alice"), set(&["b", "c"]));
    assert!(reopened.load("nobody").is_empty());

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_effective_set_converges_to_union() {
    let (_, state, store, _) = create_test_app();
    let alice = seed_user(&state, &store, "alice").await;
    seed_user(&state, &store, "b").await;

    // Local-only link, made while offline.
    store.get("alice").await.unwrap();
    store.set_offline(true);
    state.follow.propose(&alice, "b").await.unwrap();
    store.set_offline(false);

    // Remote-only links, written by another device.
    let mut doc = store.raw("alice").unwrap();
    doc.followed_users = vec!["c".to_string(), "d".to_string()];
    store.put(&doc).await.unwrap();

    let effective = state.follow.load_effective("alice").await.unwrap();
    assert_eq!(effective, set(&["b", "c", "d"]));

    // The union was written back locally: emptying the remote set does
    // not shrink the effective set.
    let mut doc = store.raw("alice").unwrap();
    doc.followed_users.clear();
    store.put(&doc).await.unwrap();

    let effective = state.follow.load_effective("alice").await.unwrap();
    assert_eq!(effective, set(&["b", "c", "d"]));
}

#[tokio::test]
async fn test_only_disconnect_shrinks_local_set() {
    let (_, state, store, _) = create_test_app();
    let alice = seed_user(&state, &store, "alice").await;
    seed_user(&state, &store, "b").await;

    state.follow.propose(&alice, "b").await.unwrap();
    assert!(state.follow.load_effective("alice").await.unwrap().contains("b"));

    state.follow.disconnect(&alice, "b").await.unwrap();
    assert!(state.follow.load_effective("alice").await.unwrap().is_empty());
}
