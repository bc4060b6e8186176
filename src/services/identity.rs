// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity provider: accounts, credentials, and session issuance.
//!
//! Every core operation receives an explicit [`Session`] value; there
//! is no ambient current-user state. Session changes are published on a
//! broadcast stream so observers (presence teardown, publishers) can
//! react to sign-out and deletion.

use std::num::NonZeroU32;
use std::sync::Arc;

use ring::rand::{SecureRandom, SystemRandom};
use ring::pbkdf2;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::middleware::auth::create_jwt;
use crate::models::Account;
use crate::store::ProfileStore;
use crate::time_utils::now_millis;

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;
const PBKDF2_ITERATIONS: u32 = 100_000;
const CREDENTIAL_LEN: usize = 32;
const SALT_LEN: usize = 16;

/// An authenticated session: the stable user id plus its bearer token.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub token: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
        }
    }
}

/// Session lifecycle events.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    SignedUp(String),
    SignedIn(String),
    SignedOut(String),
    Deleted(String),
}

/// Account and credential management backed by the profile store's
/// `accounts` collection.
#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn ProfileStore>,
    config: Config,
    events: broadcast::Sender<SessionEvent>,
}

impl IdentityService {
    pub fn new(store: Arc<dyn ProfileStore>, config: Config) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            store,
            config,
            events,
        }
    }

    /// Subscribe to session-change events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Create an account and issue a session.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<(Session, Account)> {
        if self.store.find_account_by_email(email).await?.is_some() {
            return Err(AppError::Precondition(
                "email is already registered".to_string(),
            ));
        }

        let rng = SystemRandom::new();
        let mut salt = [0u8; SALT_LEN];
        rng.fill(&mut salt)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("salt generation failed")))?;

        let mut derived = [0u8; CREDENTIAL_LEN];
        pbkdf2::derive(
            PBKDF2_ALG,
            NonZeroU32::new(PBKDF2_ITERATIONS).expect("nonzero iterations"),
            &salt,
            password.as_bytes(),
            &mut derived,
        );

        let account = Account {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            display_name: display_name.to_string(),
            password_salt: hex::encode(salt),
            password_hash: hex::encode(derived),
            created_at: now_millis(),
        };
        self.store.put_account(&account).await?;

        let session = self.issue_session(&account.id)?;
        tracing::info!(user_id = %account.id, "Account created");
        self.emit(SessionEvent::SignedUp(account.id.clone()));
        Ok((session, account))
    }

    /// Verify credentials and issue a session.
    pub async fn log_in(&self, email: &str, password: &str) -> Result<(Session, Account)> {
        let account = self
            .store
            .find_account_by_email(email)
            .await?
            .ok_or(AppError::Unauthorized)?;

        let salt = hex::decode(&account.password_salt).map_err(|_| AppError::Unauthorized)?;
        let expected = hex::decode(&account.password_hash).map_err(|_| AppError::Unauthorized)?;

        pbkdf2::verify(
            PBKDF2_ALG,
            NonZeroU32::new(PBKDF2_ITERATIONS).expect("nonzero iterations"),
            &salt,
            password.as_bytes(),
            &expected,
        )
        .map_err(|_| AppError::Unauthorized)?;

        let session = self.issue_session(&account.id)?;
        self.emit(SessionEvent::SignedIn(account.id.clone()));
        Ok((session, account))
    }

    /// End a session. Token invalidation is client-side (short-lived
    /// JWTs); this publishes the event for observers.
    pub fn log_out(&self, session: &Session) {
        self.emit(SessionEvent::SignedOut(session.user_id.clone()));
    }

    /// Delete the identity account record.
    pub async fn delete_account(&self, session: &Session) -> Result<()> {
        self.store.delete_account(&session.user_id).await?;
        self.emit(SessionEvent::Deleted(session.user_id.clone()));
        Ok(())
    }

    /// Account creation time (Unix milliseconds), if the account exists.
    pub async fn creation_time(&self, user_id: &str) -> Result<Option<i64>> {
        Ok(self
            .store
            .get_account(user_id)
            .await?
            .map(|a| a.created_at))
    }

    fn issue_session(&self, user_id: &str) -> Result<Session> {
        let token = create_jwt(user_id, &self.config.jwt_signing_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;
        Ok(Session::new(user_id, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn identity() -> IdentityService {
        IdentityService::new(Arc::new(MemoryStore::new()), Config::test_default())
    }

    #[tokio::test]
    async fn test_sign_up_then_log_in() {
        let identity = identity();
        let (session, account) = identity
            .sign_up("a@example.com", "hunter2hunter2", "Alice")
            .await
            .unwrap();
        assert!(!session.token.is_empty());
        assert_eq!(account.email, "a@example.com");

        let (relogin, again) = identity
            .log_in("a@example.com", "hunter2hunter2")
            .await
            .unwrap();
        assert_eq!(relogin.user_id, session.user_id);
        assert_eq!(again.id, account.id);
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let identity = identity();
        identity
            .sign_up("a@example.com", "hunter2hunter2", "Alice")
            .await
            .unwrap();
        let err = identity
            .log_in("a@example.com", "wrong-password")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let identity = identity();
        identity
            .sign_up("a@example.com", "hunter2hunter2", "Alice")
            .await
            .unwrap();
        let err = identity
            .sign_up("a@example.com", "other-password", "Alice Again")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Precondition(_)));
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let identity = identity();
        let mut events = identity.subscribe();
        let (session, _) = identity
            .sign_up("a@example.com", "hunter2hunter2", "Alice")
            .await
            .unwrap();
        identity.log_out(&session);

        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::SignedUp(_)
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::SignedOut(_)
        ));
    }
}
