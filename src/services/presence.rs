// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Visibility reconciliation: per-viewer trackers that keep a live set
//! of followed profiles and project it into the view the consent rules
//! permit.
//!
//! A tracker owns one store watch per followed id. Updates replace the
//! whole cached profile (the store is the source of truth for the
//! target's fields), and the snapshot applies the render predicate at
//! read time so a revoked grant or a cleared sharing flag takes effect
//! on the next snapshot without any tracker churn.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::try_join_all;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::models::Profile;
use crate::store::ProfileStore;

/// One followed profile as the viewer is allowed to see it.
#[derive(Debug, Clone, Serialize)]
pub struct TargetView {
    pub id: String,
    pub display_name: String,
    /// Present only while `active`.
    pub location: Option<crate::models::GeoSample>,
    /// Whether the viewer may currently render this target's location.
    pub active: bool,
}

/// Live view of the profiles one viewer follows.
pub struct PresenceTracker {
    viewer: String,
    store: Arc<dyn ProfileStore>,
    targets: Arc<DashMap<String, Profile>>,
    watchers: DashMap<String, JoinHandle<()>>,
}

impl PresenceTracker {
    pub fn new(viewer: &str, store: Arc<dyn ProfileStore>) -> Self {
        Self {
            viewer: viewer.to_string(),
            store,
            targets: Arc::new(DashMap::new()),
            watchers: DashMap::new(),
        }
    }

    pub fn viewer(&self) -> &str {
        &self.viewer
    }

    /// Start tracking `id`: seed from a one-shot read, then keep the
    /// cached profile current from a store watch. Re-following an
    /// already-tracked id is a no-op.
    pub async fn follow(&self, id: &str) -> Result<()> {
        if self.watchers.contains_key(id) {
            return Ok(());
        }

        if let Some(profile) = self.store.get(id).await? {
            self.targets.insert(id.to_string(), profile);
        }

        let mut watch = self.store.watch(id);
        let targets = self.targets.clone();
        let id_owned = id.to_string();
        let task = tokio::spawn(async move {
            while let Some(profile) = watch.next().await {
                // Replace-on-id: the document is authoritative.
                targets.insert(id_owned.clone(), profile);
            }
        });
        // A concurrent follow for the same id may have registered while
        // we awaited the seed read; exactly one watch task may survive.
        match self.watchers.entry(id.to_string()) {
            Entry::Occupied(_) => task.abort(),
            Entry::Vacant(slot) => {
                slot.insert(task);
            }
        }
        Ok(())
    }

    /// Stop tracking `id` and drop its cached profile.
    pub fn unfollow(&self, id: &str) {
        if let Some((_, task)) = self.watchers.remove(id) {
            task.abort();
        }
        self.targets.remove(id);
    }

    /// Reconcile the tracked set against `followed`: start watches for
    /// new ids, tear down watches for removed ones.
    pub async fn sync(&self, followed: &BTreeSet<String>) -> Result<()> {
        let stale: Vec<String> = self
            .watchers
            .iter()
            .map(|e| e.key().clone())
            .filter(|id| !followed.contains(id))
            .collect();
        for id in stale {
            self.unfollow(&id);
        }
        try_join_all(followed.iter().map(|id| self.follow(id))).await?;
        Ok(())
    }

    /// Project the tracked profiles into what the viewer may see.
    /// Active targets first, freshest location sample on top; inactive
    /// targets follow in id order with their location withheld.
    pub fn snapshot(&self) -> Vec<TargetView> {
        let mut active = Vec::new();
        let mut inactive = Vec::new();
        for entry in self.targets.iter() {
            let profile = entry.value();
            if profile.renderable_by(&self.viewer) {
                active.push(TargetView {
                    id: profile.id.clone(),
                    display_name: profile.display_name.clone(),
                    location: profile.location,
                    active: true,
                });
            } else {
                inactive.push(TargetView {
                    id: profile.id.clone(),
                    display_name: profile.display_name.clone(),
                    location: None,
                    active: false,
                });
            }
        }
        active.sort_by(|a, b| {
            let at = a.location.map(|l| l.last_updated).unwrap_or(0);
            let bt = b.location.map(|l| l.last_updated).unwrap_or(0);
            bt.cmp(&at).then_with(|| a.id.cmp(&b.id))
        });
        inactive.sort_by(|a, b| a.id.cmp(&b.id));
        active.extend(inactive);
        active
    }

    /// Abort every watch. Also runs on drop.
    pub fn shutdown(&self) {
        for entry in self.watchers.iter() {
            entry.value().abort();
        }
        self.watchers.clear();
        self.targets.clear();
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Per-viewer tracker registry for the server process.
pub struct PresenceRegistry {
    store: Arc<dyn ProfileStore>,
    trackers: DashMap<String, Arc<PresenceTracker>>,
}

impl PresenceRegistry {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self {
            store,
            trackers: DashMap::new(),
        }
    }

    pub fn tracker(&self, viewer: &str) -> Arc<PresenceTracker> {
        self.trackers
            .entry(viewer.to_string())
            .or_insert_with(|| Arc::new(PresenceTracker::new(viewer, self.store.clone())))
            .clone()
    }

    /// Reconcile the viewer's tracker against their followed set.
    pub async fn sync(&self, viewer: &str, followed: &BTreeSet<String>) -> Result<()> {
        self.tracker(viewer).sync(followed).await
    }

    /// Tear down a viewer's tracker (sign-out, account deletion).
    pub fn remove(&self, viewer: &str) {
        if let Some((_, tracker)) = self.trackers.remove(viewer) {
            tracker.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeoSample;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn profile(id: &str, visible_to: &[&str]) -> Profile {
        let mut p = Profile::with_defaults(id, id, &format!("{}@example.com", id), 1);
        p.visible_to = visible_to.iter().map(|s| s.to_string()).collect();
        p
    }

    #[tokio::test]
    async fn test_snapshot_hides_location_without_grant() {
        let store = Arc::new(MemoryStore::new());
        let mut b = profile("b", &[]);
        b.sharing_enabled = true;
        b.location = Some(GeoSample { lat: 1.0, lng: 2.0, last_updated: 10 });
        store.put(&b).await.unwrap();

        let tracker = PresenceTracker::new("a", store.clone());
        tracker.follow("b").await.unwrap();

        let snap = tracker.snapshot();
        assert_eq!(snap.len(), 1);
        assert!(!snap[0].active);
        assert!(snap[0].location.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_orders_active_by_freshness() {
        let store = Arc::new(MemoryStore::new());
        for (id, ts) in [("b", 10), ("c", 30), ("d", 20)] {
            let mut p = profile(id, &["a"]);
            p.sharing_enabled = true;
            p.location = Some(GeoSample { lat: 1.0, lng: 2.0, last_updated: ts });
            store.put(&p).await.unwrap();
        }
        // e: followed but not sharing
        store.put(&profile("e", &["a"])).await.unwrap();

        let tracker = PresenceTracker::new("a", store.clone());
        for id in ["b", "c", "d", "e"] {
            tracker.follow(id).await.unwrap();
        }

        let snapshot = tracker.snapshot();
        let ids: Vec<&str> = snapshot.iter().map(|t| t.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["c", "d", "b", "e"]);
    }

    #[tokio::test]
    async fn test_watch_update_replaces_cached_profile() {
        let store = Arc::new(MemoryStore::new());
        let mut b = profile("b", &["a"]);
        b.sharing_enabled = true;
        b.location = Some(GeoSample { lat: 1.0, lng: 2.0, last_updated: 10 });
        store.put(&b).await.unwrap();

        let tracker = PresenceTracker::new("a", store.clone());
        tracker.follow("b").await.unwrap();

        // Sharing flag flips off remotely
        b.sharing_enabled = false;
        store.put(&b).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let snap = tracker.snapshot();
        assert!(!snap[0].active);
        assert!(snap[0].location.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_follow_registers_single_watch() {
        let store = Arc::new(MemoryStore::new());
        store.put(&profile("b", &[])).await.unwrap();

        let tracker = PresenceTracker::new("a", store.clone());
        let (r1, r2) = tokio::join!(tracker.follow("b"), tracker.follow("b"));
        r1.unwrap();
        r2.unwrap();

        assert_eq!(tracker.watchers.len(), 1);
        assert_eq!(tracker.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_adds_and_removes_watches() {
        let store = Arc::new(MemoryStore::new());
        store.put(&profile("b", &[])).await.unwrap();
        store.put(&profile("c", &[])).await.unwrap();

        let tracker = PresenceTracker::new("a", store.clone());
        let mut followed: BTreeSet<String> =
            ["b".to_string(), "c".to_string()].into_iter().collect();
        tracker.sync(&followed).await.unwrap();
        assert_eq!(tracker.snapshot().len(), 2);

        followed.remove("b");
        tracker.sync(&followed).await.unwrap();
        let snap = tracker.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].id, "c");
    }
}
