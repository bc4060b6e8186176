// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process profile store for tests.
//!
//! Mirrors the remote store's failure modes so the protocol's
//! partial-failure paths are testable: an offline switch (reads degrade
//! to cache, writes queue until reconnect, as the mobile SDK buffers
//! them), and per-document write denial standing in for security rules
//! rejecting a foreign writer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::sync::{broadcast, mpsc};

use crate::error::{AppError, Result};
use crate::models::{Account, FollowRequest, Profile, ProfilePatch, RequestStatus};
use crate::store::{ProfileStore, ProfileWatch};
use crate::time_utils::now_millis;

#[derive(Clone)]
enum QueuedWrite {
    Merge(String, ProfilePatch),
    Request(String, String, FollowRequest),
}

/// In-memory profile store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    docs: Arc<DashMap<String, Profile>>,
    requests: Arc<DashMap<(String, String), FollowRequest>>,
    accounts: Arc<DashMap<String, Account>>,
    /// Last successfully read copies; what `get` degrades to offline.
    cache: Arc<DashMap<String, Profile>>,
    channels: Arc<DashMap<String, broadcast::Sender<Profile>>>,
    offline: Arc<AtomicBool>,
    denied_docs: Arc<DashSet<String>>,
    pending: Arc<Mutex<VecDeque<QueuedWrite>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Fault Injection ─────────────────────────────────────────

    /// Toggle connectivity. Going back online flushes writes queued
    /// while offline, in order.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
        if !offline {
            self.flush_pending();
        }
    }

    /// Reject all writes to `id`'s document with `PermissionDenied`,
    /// simulating access rules that bar foreign writers.
    pub fn deny_writes(&self, id: &str) {
        self.denied_docs.insert(id.to_string());
    }

    pub fn allow_writes(&self, id: &str) {
        self.denied_docs.remove(id);
    }

    /// Direct read of the authoritative document, bypassing the read
    /// policy. Test assertions only.
    pub fn raw(&self, id: &str) -> Option<Profile> {
        self.docs.get(id).map(|p| p.clone())
    }

    pub fn raw_request(&self, target: &str, requester: &str) -> Option<FollowRequest> {
        self.requests
            .get(&(target.to_string(), requester.to_string()))
            .map(|r| r.clone())
    }

    // ─── Internals ───────────────────────────────────────────────

    fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    fn check_writable(&self, id: &str) -> Result<()> {
        if self.denied_docs.contains(id) {
            return Err(AppError::PermissionDenied(format!("document {}", id)));
        }
        Ok(())
    }

    fn flush_pending(&self) {
        let drained: Vec<QueuedWrite> = {
            let mut pending = self.pending.lock().expect("pending lock");
            pending.drain(..).collect()
        };
        for write in drained {
            match write {
                QueuedWrite::Merge(id, patch) => self.apply_merge(&id, patch),
                QueuedWrite::Request(target, requester, request) => {
                    self.requests.insert((target, requester), request);
                }
            }
        }
    }

    fn apply_merge(&self, id: &str, patch: ProfilePatch) {
        let mut entry = self
            .docs
            .entry(id.to_string())
            .or_insert_with(|| Profile::with_defaults(id, "", "", now_millis()));
        patch.apply_to(entry.value_mut());
        let snapshot = entry.value().clone();
        drop(entry);
        self.notify(id, snapshot);
    }

    fn notify(&self, id: &str, profile: Profile) {
        if let Some(tx) = self.channels.get(id) {
            let _ = tx.send(profile);
        }
    }

    fn sender_for(&self, id: &str) -> broadcast::Sender<Profile> {
        self.channels
            .entry(id.to_string())
            .or_insert_with(|| broadcast::channel(32).0)
            .clone()
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Profile>> {
        if self.is_offline() {
            return Ok(self.cache.get(id).map(|p| p.clone()));
        }
        match self.docs.get(id) {
            Some(p) => {
                let profile = p.clone();
                self.cache.insert(id.to_string(), profile.clone());
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    async fn get_cached(&self, id: &str) -> Option<Profile> {
        self.cache.get(id).map(|p| p.clone())
    }

    async fn set_merge(&self, id: &str, patch: ProfilePatch) -> Result<()> {
        self.check_writable(id)?;
        if self.is_offline() {
            self.pending
                .lock()
                .expect("pending lock")
                .push_back(QueuedWrite::Merge(id.to_string(), patch));
            return Err(AppError::Offline(format!("write to {} queued", id)));
        }
        self.apply_merge(id, patch);
        Ok(())
    }

    async fn put(&self, profile: &Profile) -> Result<()> {
        self.check_writable(&profile.id)?;
        if self.is_offline() {
            return Err(AppError::Offline(format!("write to {}", profile.id)));
        }
        self.docs.insert(profile.id.clone(), profile.clone());
        self.notify(&profile.id, profile.clone());
        Ok(())
    }

    async fn update(&self, id: &str, patch: ProfilePatch) -> Result<()> {
        self.check_writable(id)?;
        if self.is_offline() {
            return Err(AppError::Offline(format!("write to {}", id)));
        }
        if !self.docs.contains_key(id) {
            return Err(AppError::NotFound(format!("profile {}", id)));
        }
        self.apply_merge(id, patch);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.check_writable(id)?;
        if self.is_offline() {
            return Err(AppError::Offline(format!("delete of {}", id)));
        }
        self.docs.remove(id);
        self.cache.remove(id);
        Ok(())
    }

    fn watch(&self, id: &str) -> ProfileWatch {
        let (tx, rx) = mpsc::channel(16);
        let mut source = self.sender_for(id).subscribe();
        let current = self.docs.get(id).map(|p| p.clone());
        let cache = self.cache.clone();
        let id = id.to_string();

        let task = tokio::spawn(async move {
            if let Some(profile) = current {
                cache.insert(id.clone(), profile.clone());
                if tx.send(profile).await.is_err() {
                    return;
                }
            }
            loop {
                match source.recv().await {
                    Ok(profile) => {
                        cache.insert(id.clone(), profile.clone());
                        if tx.send(profile).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        ProfileWatch::new(rx, task)
    }

    // ─── Follow-Request Subcollection ────────────────────────────

    async fn put_request(
        &self,
        target: &str,
        requester: &str,
        request: &FollowRequest,
    ) -> Result<()> {
        if self.is_offline() {
            self.pending.lock().expect("pending lock").push_back(
                QueuedWrite::Request(target.to_string(), requester.to_string(), request.clone()),
            );
            return Err(AppError::Offline(format!(
                "request write ({}, {}) queued",
                target, requester
            )));
        }
        self.requests
            .insert((target.to_string(), requester.to_string()), request.clone());
        Ok(())
    }

    async fn get_request(&self, target: &str, requester: &str) -> Result<Option<FollowRequest>> {
        Ok(self
            .requests
            .get(&(target.to_string(), requester.to_string()))
            .map(|r| r.clone()))
    }

    async fn set_request_status(
        &self,
        target: &str,
        requester: &str,
        status: RequestStatus,
    ) -> Result<()> {
        let key = (target.to_string(), requester.to_string());
        match self.requests.get_mut(&key) {
            Some(mut request) => {
                request.status = status;
                Ok(())
            }
            None => Err(AppError::NotFound(format!(
                "request ({}, {})",
                target, requester
            ))),
        }
    }

    async fn delete_request(&self, target: &str, requester: &str) -> Result<()> {
        self.requests
            .remove(&(target.to_string(), requester.to_string()));
        Ok(())
    }

    async fn pending_requests_for(&self, target: &str) -> Result<Vec<FollowRequest>> {
        Ok(self
            .requests
            .iter()
            .filter(|entry| {
                entry.key().0 == target && entry.value().status == RequestStatus::Pending
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    // ─── Accounts ────────────────────────────────────────────────

    async fn get_account(&self, id: &str) -> Result<Option<Account>> {
        Ok(self.accounts.get(id).map(|a| a.clone()))
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        Ok(self
            .accounts
            .iter()
            .find(|entry| entry.value().email == email)
            .map(|entry| entry.value().clone()))
    }

    async fn put_account(&self, account: &Account) -> Result<()> {
        self.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn delete_account(&self, id: &str) -> Result<()> {
        self.accounts.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_read_degrades_to_cache() {
        let store = MemoryStore::new();
        let profile = Profile::with_defaults("a", "A", "a@example.com", 0);
        store.put(&profile).await.unwrap();
        store.get("a").await.unwrap(); // warm cache

        store.set_offline(true);
        let cached = store.get("a").await.unwrap().unwrap();
        assert_eq!(cached.id, "a");
        assert!(store.get("never-read").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_offline_merge_queues_and_flushes() {
        let store = MemoryStore::new();
        store
            .put(&Profile::with_defaults("a", "A", "a@example.com", 0))
            .await
            .unwrap();

        store.set_offline(true);
        let patch = ProfilePatch {
            sharing_enabled: Some(true),
            ..Default::default()
        };
        let err = store.set_merge("a", patch).await.unwrap_err();
        assert!(matches!(err, AppError::Offline(_)));
        assert!(!store.raw("a").unwrap().sharing_enabled);

        store.set_offline(false);
        assert!(store.raw("a").unwrap().sharing_enabled);
    }

    #[tokio::test]
    async fn test_denied_write_is_permission_denied() {
        let store = MemoryStore::new();
        store
            .put(&Profile::with_defaults("b", "B", "b@example.com", 0))
            .await
            .unwrap();
        store.deny_writes("b");

        let patch = ProfilePatch {
            allow_follow: Some(false),
            ..Default::default()
        };
        let err = store.set_merge("b", patch).await.unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_watch_delivers_current_then_changes() {
        let store = MemoryStore::new();
        store
            .put(&Profile::with_defaults("a", "A", "a@example.com", 0))
            .await
            .unwrap();

        let mut watch = store.watch("a");
        let first = watch.next().await.unwrap();
        assert!(!first.sharing_enabled);

        store
            .set_merge(
                "a",
                ProfilePatch {
                    sharing_enabled: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let second = watch.next().await.unwrap();
        assert!(second.sharing_enabled);
    }
}
