// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session and account lifecycle orchestration.
//!
//! Ties identity-provider state to profile records: every session start
//! ensures a profile exists, and account deletion runs as an explicit
//! two-step saga (profile first, then identity) that stays retryable if
//! the second step fails.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{Account, Profile, ProfilePatch};
use crate::services::identity::{IdentityService, Session};
use crate::store::ProfileStore;

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn ProfileStore>,
    identity: IdentityService,
}

impl SessionService {
    pub fn new(store: Arc<dyn ProfileStore>, identity: IdentityService) -> Self {
        Self { store, identity }
    }

    /// Create the identity account and materialize the profile record
    /// with default field values.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<(Session, Profile)> {
        let (session, account) = self.identity.sign_up(email, password, display_name).await?;
        let profile = Profile::with_defaults(
            &account.id,
            &account.display_name,
            &account.email,
            account.created_at,
        );
        self.store.put(&profile).await?;
        Ok((session, profile))
    }

    /// Authenticate and ensure the profile record exists. Login never
    /// mutates the profile beyond ensuring-exists and the `created_at`
    /// backfill.
    pub async fn log_in(&self, email: &str, password: &str) -> Result<(Session, Profile)> {
        let (session, account) = self.identity.log_in(email, password).await?;
        let profile = self.ensure_profile(&account).await?;
        Ok((session, profile))
    }

    /// Materialize a missing profile with defaults; backfill a missing
    /// `created_at` from the account metadata.
    pub async fn ensure_profile(&self, account: &Account) -> Result<Profile> {
        match self.store.get(&account.id).await? {
            Some(mut profile) => {
                if profile.created_at == 0 {
                    profile.created_at = account.created_at;
                    let patch = ProfilePatch {
                        created_at: Some(account.created_at),
                        ..Default::default()
                    };
                    if let Err(err) = self.store.update(&account.id, patch).await {
                        tracing::warn!(user_id = %account.id, error = %err,
                            "created_at backfill failed");
                    }
                }
                Ok(profile)
            }
            None => {
                let profile = Profile::with_defaults(
                    &account.id,
                    &account.display_name,
                    &account.email,
                    account.created_at,
                );
                self.store.put(&profile).await?;
                tracing::info!(user_id = %account.id, "Profile materialized on session start");
                Ok(profile)
            }
        }
    }

    pub fn log_out(&self, session: &Session) {
        self.identity.log_out(session);
    }

    /// Delete profile record, then identity account.
    ///
    /// The sequence is non-atomic by nature of the two backing systems.
    /// If the identity step fails after the profile delete succeeded,
    /// the caller gets `DeletionIncomplete`; invoking this again retries
    /// only the remaining step (the profile delete is a no-op once the
    /// record is gone).
    pub async fn delete_account(&self, session: &Session) -> Result<()> {
        match self.store.delete(&session.user_id).await {
            Ok(()) => {}
            Err(AppError::NotFound(_)) => {
                // Retry after a previously incomplete deletion.
                tracing::debug!(user_id = %session.user_id, "Profile already deleted");
            }
            Err(err) => return Err(err),
        }

        self.identity.delete_account(session).await.map_err(|err| {
            AppError::DeletionIncomplete(format!(
                "profile removed but account deletion failed: {}",
                err
            ))
        })
    }
}
