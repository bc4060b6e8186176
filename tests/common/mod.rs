// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use pairtrack::cache::ShadowCache;
use pairtrack::config::Config;
use pairtrack::models::Profile;
use pairtrack::routes::create_router;
use pairtrack::services::{PushLocationSource, Session};
use pairtrack::store::{MemoryStore, ProfileStore};
use pairtrack::AppState;
use pairtrack::time_utils::now_millis;
use std::sync::Arc;

/// Create a test app backed by the in-memory store.
/// Returns the router, the shared state, and the fault-injectable
/// store and location source handles.
#[allow(dead_code)]
pub fn create_test_app() -> (
    axum::Router,
    Arc<AppState>,
    Arc<MemoryStore>,
    Arc<PushLocationSource>,
) {
    let config = Config::test_default();
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(PushLocationSource::new());

    let state = Arc::new(AppState::build(
        config,
        store.clone(),
        source.clone(),
        ShadowCache::new_memory(),
    ));

    (create_router(state.clone()), state, store, source)
}

/// Seed a profile with a recent creation time and return a session
/// for it. Bypasses the signup flow for tests that exercise the
/// protocol services directly.
#[allow(dead_code)]
pub async fn seed_user(state: &Arc<AppState>, store: &MemoryStore, id: &str) -> Session {
    let profile = Profile::with_defaults(
        id,
        id,
        &format!("{}@example.com", id),
        now_millis(),
    );
    store.put(&profile).await.expect("seed profile");

    let token = pairtrack::middleware::auth::create_jwt(id, &state.config.jwt_signing_key)
        .expect("create jwt");
    Session::new(id, token)
}
