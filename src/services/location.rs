// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Device location source abstraction.
//!
//! Models the platform location API the publisher consumes: permission
//! requests, a one-shot position read, and continuous watches with
//! combined time/distance thresholds. The push-driven implementation
//! receives raw samples (from ingest endpoints in production, from test
//! code in tests) and applies the thresholds the way a device watcher
//! would.

use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use geo::{Distance, Haversine, Point};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Thresholds for a continuous watch: a sample is emitted when either
/// the interval has elapsed or the device moved far enough, whichever
/// comes first.
#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    pub interval: std::time::Duration,
    pub distance_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Great-circle distance between two samples, in meters.
pub fn distance_between_m(a: Coordinates, b: Coordinates) -> f64 {
    Haversine.distance(Point::new(a.lng, a.lat), Point::new(b.lng, b.lat))
}

/// Continuous stream of position samples. Dropping the handle stops
/// the watch.
pub struct PositionWatch {
    rx: mpsc::Receiver<Coordinates>,
    task: JoinHandle<()>,
}

impl PositionWatch {
    pub fn new(rx: mpsc::Receiver<Coordinates>, task: JoinHandle<()>) -> Self {
        Self { rx, task }
    }

    pub async fn next(&mut self) -> Option<Coordinates> {
        self.rx.recv().await
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for PositionWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Platform location API, scoped per user.
#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn request_foreground(&self, user: &str) -> PermissionStatus;

    async fn request_background(&self, user: &str) -> PermissionStatus;

    /// One-shot last-known position.
    async fn current_position(&self, user: &str) -> Result<Coordinates>;

    /// Continuous foreground watch with the given thresholds.
    fn watch(&self, user: &str, opts: WatchOptions) -> PositionWatch;

    /// Continuous background watch. Best-effort: delivery is subject to
    /// OS throttling and the channel may fail to start at all.
    fn watch_background(&self, user: &str, opts: WatchOptions) -> Result<PositionWatch>;
}

/// Push-driven location source.
///
/// Raw samples are pushed per user; each watch applies its own
/// time/distance thresholds, so foreground and background watchers on
/// the same feed emit at different rates.
#[derive(Default)]
pub struct PushLocationSource {
    channels: DashMap<String, broadcast::Sender<Coordinates>>,
    last: DashMap<String, Coordinates>,
    foreground_denied: DashMap<String, ()>,
    background_denied: DashMap<String, ()>,
}

impl PushLocationSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a raw sample for `user` into all of their watches.
    pub fn push(&self, user: &str, sample: Coordinates) {
        self.last.insert(user.to_string(), sample);
        if let Some(tx) = self.channels.get(user) {
            let _ = tx.send(sample);
        }
    }

    pub fn set_foreground_permission(&self, user: &str, granted: bool) {
        if granted {
            self.foreground_denied.remove(user);
        } else {
            self.foreground_denied.insert(user.to_string(), ());
        }
    }

    pub fn set_background_permission(&self, user: &str, granted: bool) {
        if granted {
            self.background_denied.remove(user);
        } else {
            self.background_denied.insert(user.to_string(), ());
        }
    }

    fn sender_for(&self, user: &str) -> broadcast::Sender<Coordinates> {
        self.channels
            .entry(user.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }

    fn spawn_watch(&self, user: &str, opts: WatchOptions) -> PositionWatch {
        let (tx, rx) = mpsc::channel(32);
        let mut source = self.sender_for(user).subscribe();

        let task = tokio::spawn(async move {
            let mut last_emit: Option<(Instant, Coordinates)> = None;
            loop {
                let sample = match source.recv().await {
                    Ok(sample) => sample,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                };
                let due = match last_emit {
                    None => true,
                    Some((at, prev)) => {
                        at.elapsed() >= opts.interval
                            || distance_between_m(prev, sample) >= opts.distance_m
                    }
                };
                if due {
                    last_emit = Some((Instant::now(), sample));
                    if tx.send(sample).await.is_err() {
                        return;
                    }
                }
            }
        });

        PositionWatch::new(rx, task)
    }
}

#[async_trait]
impl LocationSource for PushLocationSource {
    async fn request_foreground(&self, user: &str) -> PermissionStatus {
        if self.foreground_denied.contains_key(user) {
            PermissionStatus::Denied
        } else {
            PermissionStatus::Granted
        }
    }

    async fn request_background(&self, user: &str) -> PermissionStatus {
        if self.background_denied.contains_key(user) {
            PermissionStatus::Denied
        } else {
            PermissionStatus::Granted
        }
    }

    async fn current_position(&self, user: &str) -> Result<Coordinates> {
        self.last
            .get(user)
            .map(|c| *c)
            .ok_or_else(|| AppError::NotFound(format!("no position for {}", user)))
    }

    fn watch(&self, user: &str, opts: WatchOptions) -> PositionWatch {
        self.spawn_watch(user, opts)
    }

    fn watch_background(&self, user: &str, opts: WatchOptions) -> Result<PositionWatch> {
        Ok(self.spawn_watch(user, opts))
    }
}
