// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Follow-request consent artifact.
//!
//! Stored at `users/{target}/requests/{requester}`. Deny deletes the
//! record; accept retains it with `status=accepted` so any access rule
//! keyed on request existence keeps permitting the requester's reads.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
}

/// A pending or accepted follow proposal. There is no terminal "denied"
/// state; denial removes the document entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowRequest {
    /// Requester id
    pub from: String,
    pub status: RequestStatus,
    /// Unix milliseconds
    pub created_at: i64,
}

impl FollowRequest {
    pub fn pending(from: &str, created_at: i64) -> Self {
        Self {
            from: from.to_string(),
            status: RequestStatus::Pending,
            created_at,
        }
    }
}
