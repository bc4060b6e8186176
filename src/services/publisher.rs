// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Throttled live-location publisher.
//!
//! Bridges the device location source and the profile store: while a
//! share is active, position samples that pass the time/distance
//! thresholds are written to the owner's document together with the
//! `sharing_enabled` flag. The foreground watch is mandatory; the
//! background watch is an optional second feed with coarser thresholds.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::config::PublisherConfig;
use crate::error::{AppError, Result};
use crate::models::{GeoSample, ProfilePatch};
use crate::services::identity::Session;
use crate::services::location::{
    LocationSource, PermissionStatus, PositionWatch, WatchOptions,
};
use crate::store::ProfileStore;
use crate::time_utils::now_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareState {
    Stopped,
    Starting,
    Active,
}

struct ActiveShare {
    foreground: JoinHandle<()>,
    background: Option<JoinHandle<()>>,
}

impl Drop for ActiveShare {
    fn drop(&mut self) {
        self.foreground.abort();
        if let Some(bg) = &self.background {
            bg.abort();
        }
    }
}

pub struct SharePublisher {
    store: Arc<dyn ProfileStore>,
    source: Arc<dyn LocationSource>,
    config: PublisherConfig,
    trial_days: i64,
    shares: DashMap<String, ActiveShare>,
    states: DashMap<String, ShareState>,
}

impl SharePublisher {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        source: Arc<dyn LocationSource>,
        config: PublisherConfig,
        trial_days: i64,
    ) -> Self {
        Self {
            store,
            source,
            config,
            trial_days,
            shares: DashMap::new(),
            states: DashMap::new(),
        }
    }

    pub fn state(&self, user_id: &str) -> ShareState {
        self.states
            .get(user_id)
            .map(|s| *s)
            .unwrap_or(ShareState::Stopped)
    }

    /// Begin broadcasting. Idempotent: a second start while active is a
    /// no-op. Requires an entitlement and foreground location
    /// permission; background permission is requested but optional.
    pub async fn start(&self, session: &Session) -> Result<()> {
        let user_id = session.user_id.as_str();

        if self.state(user_id) == ShareState::Active {
            return Ok(());
        }
        self.states.insert(user_id.to_string(), ShareState::Starting);

        let result = self.start_inner(user_id).await;
        if result.is_err() {
            self.states.insert(user_id.to_string(), ShareState::Stopped);
        }
        result
    }

    async fn start_inner(&self, user_id: &str) -> Result<()> {
        let profile = self
            .store
            .get(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("profile {}", user_id)))?;
        if !profile.has_entitlement(now_millis(), self.trial_days) {
            return Err(AppError::Precondition(
                "an active plan or trial is required to share".to_string(),
            ));
        }

        if self.source.request_foreground(user_id).await == PermissionStatus::Denied {
            return Err(AppError::Precondition(
                "location permission is required to share".to_string(),
            ));
        }

        let fg_watch = self.source.watch(
            user_id,
            WatchOptions {
                interval: self.config.foreground_interval,
                distance_m: self.config.foreground_distance_m,
            },
        );
        let foreground = self.spawn_writer(user_id, fg_watch);

        // Background delivery is opportunistic. Denied permission or a
        // failed watch start just leaves the foreground feed alone.
        let background = if self.source.request_background(user_id).await
            == PermissionStatus::Granted
        {
            match self.source.watch_background(
                user_id,
                WatchOptions {
                    interval: self.config.background_interval,
                    distance_m: self.config.background_distance_m,
                },
            ) {
                Ok(watch) => Some(self.spawn_writer(user_id, watch)),
                Err(err) => {
                    tracing::warn!(user_id, error = %err, "Background watch unavailable");
                    None
                }
            }
        } else {
            None
        };

        self.shares.insert(
            user_id.to_string(),
            ActiveShare {
                foreground,
                background,
            },
        );
        self.states.insert(user_id.to_string(), ShareState::Active);
        tracing::info!(user_id, "Location sharing started");
        Ok(())
    }

    /// Stop broadcasting: tear down the watches and clear the sharing
    /// flag. Idempotent, and the flag write is attempted even when no
    /// share was active in this process.
    pub async fn stop(&self, session: &Session) -> Result<()> {
        self.stop_for(&session.user_id).await
    }

    /// [`stop`](Self::stop) keyed by user id, for observers that hold no
    /// session (the sign-out event handler).
    pub async fn stop_for(&self, user_id: &str) -> Result<()> {
        // Dropping ActiveShare aborts both publish loops.
        self.shares.remove(user_id);
        self.states.insert(user_id.to_string(), ShareState::Stopped);

        let patch = ProfilePatch {
            sharing_enabled: Some(false),
            ..Default::default()
        };
        match self.store.set_merge(user_id, patch).await {
            Ok(()) => {}
            Err(err) if err.ignorable_on_mirror() => {
                tracing::warn!(user_id, error = %err,
                    "Sharing flag clear deferred, stale flag may persist");
            }
            Err(err) => return Err(err),
        }
        tracing::info!(user_id, "Location sharing stopped");
        Ok(())
    }

    /// Abort publish loops without touching the store. Used during
    /// teardown when the profile document is about to be deleted.
    pub fn abort(&self, user_id: &str) {
        self.shares.remove(user_id);
        self.states.insert(user_id.to_string(), ShareState::Stopped);
    }

    fn spawn_writer(&self, user_id: &str, mut watch: PositionWatch) -> JoinHandle<()> {
        let store = self.store.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            while let Some(pos) = watch.next().await {
                let patch = ProfilePatch {
                    sharing_enabled: Some(true),
                    location: Some(GeoSample {
                        lat: pos.lat,
                        lng: pos.lng,
                        last_updated: now_millis(),
                    }),
                    ..Default::default()
                };
                if let Err(err) = store.set_merge(&user_id, patch).await {
                    // Dropped samples are acceptable; the next one retries.
                    tracing::warn!(user_id = %user_id, error = %err,
                        "Location publish failed");
                }
            }
        })
    }
}
