// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile store layer.
//!
//! Typed get/set/update/delete/watch operations against the remote
//! profile store, with cache-fallback read semantics. Reads used for
//! go/no-go decisions are bounded by a short timeout and degrade to the
//! last cached value; absence is reported as `Ok(None)`, never as a
//! fatal error.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::models::{Account, FollowRequest, Profile, ProfilePatch, RequestStatus};

/// Collection names as constants.
pub mod collections {
    pub const PROFILES: &str = "users";
    /// Subcollection of `users/{id}`, keyed by requester id.
    pub const REQUESTS: &str = "requests";
    pub const ACCOUNTS: &str = "accounts";
}

/// Live subscription to one profile document.
///
/// Snapshots arrive in server order for this document only; there is no
/// ordering guarantee across different watches. Dropping the handle (or
/// calling `stop`) tears the subscription down.
pub struct ProfileWatch {
    rx: mpsc::Receiver<Profile>,
    task: JoinHandle<()>,
}

impl ProfileWatch {
    pub fn new(rx: mpsc::Receiver<Profile>, task: JoinHandle<()>) -> Self {
        Self { rx, task }
    }

    /// Next snapshot, or `None` once the watch has ended.
    pub async fn next(&mut self) -> Option<Profile> {
        self.rx.recv().await
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for ProfileWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Typed operations against the remote profile store.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    // ─── Profile Documents ───────────────────────────────────────

    /// Network read bounded by the configured timeout; falls back to the
    /// cached copy on timeout or network failure. `Ok(None)` means the
    /// target is unknown.
    async fn get(&self, id: &str) -> Result<Option<Profile>>;

    /// Best-effort cached read, no network wait.
    async fn get_cached(&self, id: &str) -> Option<Profile>;

    /// Merge-write: unset patch fields are left untouched. Creates the
    /// document when absent.
    async fn set_merge(&self, id: &str, patch: ProfilePatch) -> Result<()>;

    /// Replace the whole document.
    async fn put(&self, profile: &Profile) -> Result<()>;

    /// Patch an existing document; `NotFound` when absent.
    async fn update(&self, id: &str, patch: ProfilePatch) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Subscribe to document changes. The current snapshot (if any) is
    /// delivered first.
    fn watch(&self, id: &str) -> ProfileWatch;

    // ─── Follow-Request Subcollection ────────────────────────────

    async fn put_request(
        &self,
        target: &str,
        requester: &str,
        request: &FollowRequest,
    ) -> Result<()>;

    async fn get_request(&self, target: &str, requester: &str) -> Result<Option<FollowRequest>>;

    async fn set_request_status(
        &self,
        target: &str,
        requester: &str,
        status: RequestStatus,
    ) -> Result<()>;

    async fn delete_request(&self, target: &str, requester: &str) -> Result<()>;

    /// All pending requests proposed to `target`.
    async fn pending_requests_for(&self, target: &str) -> Result<Vec<FollowRequest>>;

    // ─── Accounts (identity provider storage) ────────────────────

    async fn get_account(&self, id: &str) -> Result<Option<Account>>;

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>>;

    async fn put_account(&self, account: &Account) -> Result<()>;

    async fn delete_account(&self, id: &str) -> Result<()>;
}
