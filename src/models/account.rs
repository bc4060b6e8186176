// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity-provider account record.
//!
//! Kept separate from the profile document: the profile is user-mutable
//! application state, the account holds credentials and immutable
//! metadata. Account deletion and profile deletion are distinct steps.

use serde::{Deserialize, Serialize};

/// Account stored in the `accounts` collection, keyed by user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Stable opaque user id (also the document ID)
    pub id: String,
    pub email: String,
    pub display_name: String,
    /// PBKDF2 salt, hex encoded
    pub password_salt: String,
    /// PBKDF2-HMAC-SHA256 derived key, hex encoded
    pub password_hash: String,
    /// Account creation time (Unix milliseconds). Source of truth for
    /// the profile `created_at` backfill.
    pub created_at: i64,
}
