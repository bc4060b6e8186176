// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Pairtrack: consent-based live location sharing.
//!
//! This crate provides the backend for pairing users via share codes,
//! running the follow-request consent protocol, and publishing live
//! location samples to linked, consenting users.

pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod time_utils;

use std::sync::Arc;

use cache::ShadowCache;
use config::Config;
use services::{
    FollowService, IdentityService, LocationSource, PresenceRegistry, SessionEvent,
    SessionService, SharePublisher,
};
use store::ProfileStore;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ProfileStore>,
    pub identity: IdentityService,
    pub sessions: SessionService,
    pub follow: FollowService,
    pub presence: Arc<PresenceRegistry>,
    pub publisher: Arc<SharePublisher>,
}

impl AppState {
    /// Wire up all services against a store, location source, and shadow cache.
    pub fn build(
        config: Config,
        store: Arc<dyn ProfileStore>,
        source: Arc<dyn LocationSource>,
        shadow: ShadowCache,
    ) -> Self {
        let identity = IdentityService::new(store.clone(), config.clone());
        let sessions = SessionService::new(store.clone(), identity.clone());
        let publisher = Arc::new(SharePublisher::new(
            store.clone(),
            source.clone(),
            config.publisher.clone(),
            config.trial_days,
        ));
        let follow = FollowService::new(
            store.clone(),
            shadow,
            publisher.clone(),
            source,
            config.trial_days,
        );
        let presence = Arc::new(PresenceRegistry::new(store.clone()));

        // Session end releases every live resource the user holds:
        // presence watches and publish loops.
        let mut events = identity.subscribe();
        let presence_for_events = presence.clone();
        let publisher_for_events = publisher.clone();
        tokio::spawn(async move {
            use tokio::sync::broadcast::error::RecvError;
            loop {
                match events.recv().await {
                    Ok(SessionEvent::SignedOut(user_id)) => {
                        presence_for_events.remove(&user_id);
                        // Full stop: the sharing flag must not stay set
                        // after the user signs out.
                        if publisher_for_events.state(&user_id) != services::ShareState::Stopped {
                            if let Err(err) = publisher_for_events.stop_for(&user_id).await {
                                tracing::warn!(user_id = %user_id, error = %err,
                                    "Sharing stop on sign-out failed");
                            }
                        }
                    }
                    Ok(SessionEvent::Deleted(user_id)) => {
                        // The profile document is being deleted; no
                        // point writing the flag into it.
                        presence_for_events.remove(&user_id);
                        publisher_for_events.abort(&user_id);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Self {
            config,
            store,
            identity,
            sessions,
            follow,
            presence,
            publisher,
        }
    }
}
