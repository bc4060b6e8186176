// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed profile store.
//!
//! Wraps the `firestore` client with the read policy the protocol
//! requires: every network read is bounded by a short timeout and falls
//! back to a per-process cache, so a slow or offline store degrades to
//! "unknown" instead of hanging a user-facing decision.
//!
//! Document watches are implemented as bounded polling tasks rather
//! than the listen API; the protocol only needs replace-on-id snapshot
//! delivery, not change granularity.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::error::{AppError, Result};
use crate::models::{Account, FollowRequest, Profile, ProfilePatch, RequestStatus};
use crate::store::{collections, ProfileStore, ProfileWatch};
use crate::time_utils::now_millis;

/// Firestore profile store client.
#[derive(Clone)]
pub struct FirestoreStore {
    client: Option<firestore::FirestoreDb>,
    cache: Arc<DashMap<String, Profile>>,
    read_timeout: Duration,
    watch_poll_interval: Duration,
}

impl FirestoreStore {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(
        project_id: &str,
        read_timeout: Duration,
        watch_poll_interval: Duration,
    ) -> Result<Self> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        let client = if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            Self::create_emulator_client(project_id).await?
        } else {
            let client = firestore::FirestoreDb::new(project_id)
                .await
                .map_err(|e| AppError::Store(format!("Failed to connect to Firestore: {}", e)))?;
            tracing::info!(project = project_id, "Connected to Firestore");
            client
        };

        Ok(Self {
            client: Some(client),
            cache: Arc::new(DashMap::new()),
            read_timeout,
            watch_poll_interval,
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<firestore::FirestoreDb> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| AppError::Store(format!("Failed to connect to Firestore Emulator: {}", e)))?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(client)
    }

    /// Create a disconnected store for testing (offline mode).
    ///
    /// Writes fail with `Offline`; reads degrade to the cache.
    pub fn new_mock() -> Self {
        Self {
            client: None,
            cache: Arc::new(DashMap::new()),
            read_timeout: Duration::from_millis(100),
            watch_poll_interval: Duration::from_millis(100),
        }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Offline("Store not connected (offline mode)".to_string()))
    }

    /// Unbounded network read of one profile document.
    async fn fetch_profile(&self, id: &str) -> Result<Option<Profile>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PROFILES)
            .obj()
            .one(id)
            .await
            .map_err(map_store_err)
    }

    /// Read-modify-write of one profile document. Absence is handled by
    /// `on_absent`: create from defaults (merge semantics) or refuse.
    async fn patch_profile(&self, id: &str, patch: ProfilePatch, create: bool) -> Result<()> {
        let fetched = tokio::time::timeout(self.read_timeout, self.fetch_profile(id))
            .await
            .map_err(|_| AppError::Timeout(format!("read of {} before write", id)))??;

        let mut profile = match fetched {
            Some(p) => p,
            None if create => Profile::with_defaults(id, "", "", now_millis()),
            None => return Err(AppError::NotFound(format!("profile {}", id))),
        };
        patch.apply_to(&mut profile);
        self.put(&profile).await
    }
}

#[async_trait]
impl ProfileStore for FirestoreStore {
    async fn get(&self, id: &str) -> Result<Option<Profile>> {
        match tokio::time::timeout(self.read_timeout, self.fetch_profile(id)).await {
            Ok(Ok(Some(profile))) => {
                self.cache.insert(id.to_string(), profile.clone());
                Ok(Some(profile))
            }
            Ok(Ok(None)) => Ok(None),
            Ok(Err(err)) => {
                tracing::warn!(id, error = %err, "Profile read failed, falling back to cache");
                Ok(self.cache.get(id).map(|p| p.clone()))
            }
            Err(_) => {
                tracing::warn!(id, "Profile read timed out, falling back to cache");
                Ok(self.cache.get(id).map(|p| p.clone()))
            }
        }
    }

    async fn get_cached(&self, id: &str) -> Option<Profile> {
        self.cache.get(id).map(|p| p.clone())
    }

    async fn set_merge(&self, id: &str, patch: ProfilePatch) -> Result<()> {
        self.patch_profile(id, patch, true).await
    }

    async fn put(&self, profile: &Profile) -> Result<()> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::PROFILES)
            .document_id(&profile.id)
            .object(profile)
            .execute()
            .await
            .map_err(map_store_err)?;
        self.cache.insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn update(&self, id: &str, patch: ProfilePatch) -> Result<()> {
        self.patch_profile(id, patch, false).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::PROFILES)
            .document_id(id)
            .execute()
            .await
            .map_err(map_store_err)?;
        self.cache.remove(id);
        Ok(())
    }

    fn watch(&self, id: &str) -> ProfileWatch {
        let (tx, rx) = mpsc::channel(16);
        let store = self.clone();
        let id = id.to_string();

        let task = tokio::spawn(async move {
            let mut last: Option<Profile> = store.cache.get(&id).map(|p| p.clone());
            if let Some(p) = &last {
                if tx.send(p.clone()).await.is_err() {
                    return;
                }
            }
            let mut ticker = tokio::time::interval(store.watch_poll_interval);
            loop {
                ticker.tick().await;
                // Poll errors leave the last-known snapshot in place.
                let snapshot = match store.fetch_profile(&id).await {
                    Ok(Some(p)) => p,
                    Ok(None) | Err(_) => continue,
                };
                let changed = last
                    .as_ref()
                    .map(|p| {
                        p.location.map(|l| l.last_updated)
                            != snapshot.location.map(|l| l.last_updated)
                            || p.sharing_enabled != snapshot.sharing_enabled
                            || p.visible_to != snapshot.visible_to
                            || p.followed_users != snapshot.followed_users
                            || p.allow_follow != snapshot.allow_follow
                            || p.display_name != snapshot.display_name
                    })
                    .unwrap_or(true);
                if changed {
                    store.cache.insert(id.clone(), snapshot.clone());
                    last = Some(snapshot.clone());
                    if tx.send(snapshot).await.is_err() {
                        return;
                    }
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
        let client = self.get_client()?;
        let parent = client
            .parent_path(collections::PROFILES, target)
            .map_err(map_store_err)?;
        let _: () = client
            .fluent()
            .update()
            .in_col(collections::REQUESTS)
            .document_id(requester)
            .parent(&parent)
            .object(request)
            .execute()
            .await
            .map_err(map_store_err)?;
        Ok(())
    }

    async fn get_request(&self, target: &str, requester: &str) -> Result<Option<FollowRequest>> {
        let client = self.get_client()?;
        let parent = client
            .parent_path(collections::PROFILES, target)
            .map_err(map_store_err)?;
        client
            .fluent()
            .select()
            .by_id_in(collections::REQUESTS)
            .parent(&parent)
            .obj()
            .one(requester)
            .await
            .map_err(map_store_err)
    }

    async fn set_request_status(
        &self,
        target: &str,
        requester: &str,
        status: RequestStatus,
    ) -> Result<()> {
        let mut request = self
            .get_request(target, requester)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("request ({}, {})", target, requester)))?;
        request.status = status;
        self.put_request(target, requester, &request).await
    }

    async fn delete_request(&self, target: &str, requester: &str) -> Result<()> {
        let client = self.get_client()?;
        let parent = client
            .parent_path(collections::PROFILES, target)
            .map_err(map_store_err)?;
        client
            .fluent()
            .delete()
            .from(collections::REQUESTS)
            .parent(&parent)
            .document_id(requester)
            .execute()
            .await
            .map_err(map_store_err)?;
        Ok(())
    }

    async fn pending_requests_for(&self, target: &str) -> Result<Vec<FollowRequest>> {
        let client = self.get_client()?;
        let parent = client
            .parent_path(collections::PROFILES, target)
            .map_err(map_store_err)?;
        client
            .fluent()
            .select()
            .from(collections::REQUESTS)
            .parent(&parent)
            .filter(|q| q.for_all([q.field("status").eq("pending")]))
            .obj()
            .query()
            .await
            .map_err(map_store_err)
    }

    // ─── Accounts ────────────────────────────────────────────────

    async fn get_account(&self, id: &str) -> Result<Option<Account>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::ACCOUNTS)
            .obj()
            .one(id)
            .await
            .map_err(map_store_err)
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let email = email.to_string();
        let accounts: Vec<Account> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::ACCOUNTS)
            .filter(move |q| q.for_all([q.field("email").eq(email.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(map_store_err)?;
        Ok(accounts.into_iter().next())
    }

    async fn put_account(&self, account: &Account) -> Result<()> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::ACCOUNTS)
            .document_id(&account.id)
            .object(account)
            .execute()
            .await
            .map_err(map_store_err)?;
        Ok(())
    }

    async fn delete_account(&self, id: &str) -> Result<()> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::ACCOUNTS)
            .document_id(id)
            .execute()
            .await
            .map_err(map_store_err)?;
        Ok(())
    }
}

/// Classify a Firestore error into the protocol taxonomy once, at the
/// boundary, so callers never re-derive categories from message text.
fn map_store_err(err: firestore::errors::FirestoreError) -> AppError {
    use firestore::errors::FirestoreError;
    match err {
        FirestoreError::DataNotFoundError(e) => AppError::NotFound(e.to_string()),
        FirestoreError::DatabaseError(e) if e.retry_possible => AppError::Offline(e.to_string()),
        FirestoreError::DatabaseError(e)
            if e.public.code.eq_ignore_ascii_case("PermissionDenied") =>
        {
            AppError::PermissionDenied(e.to_string())
        }
        other => AppError::Store(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_store_reads_degrade_to_unknown() {
        let store = FirestoreStore::new_mock();
        let result = store.get("nobody").await.unwrap();
        assert!(result.is_none());
        assert!(store.get_cached("nobody").await.is_none());
    }

    #[tokio::test]
    async fn test_mock_store_writes_fail_offline() {
        let store = FirestoreStore::new_mock();
        let profile = Profile::with_defaults("a", "A", "a@example.com", 0);
        let err = store.put(&profile).await.unwrap_err();
        assert!(matches!(err, AppError::Offline(_) | AppError::Timeout(_)));
    }
}
