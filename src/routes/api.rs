// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::Result;
use crate::models::{FollowRequest, Profile, ProfilePatch};
use crate::services::{LinkState, Session, TargetView};
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/follow", post(propose_follow))
        .route("/api/follow/requests", get(get_follow_requests))
        .route("/api/follow/{requester}/accept", post(accept_follow))
        .route("/api/follow/{requester}", delete(deny_follow))
        .route("/api/links", get(get_links))
        .route("/api/links/{id}", delete(disconnect_link))
        .route("/api/share/start", post(start_sharing))
        .route("/api/share/stop", post(stop_sharing))
        .route("/api/settings/allow-follow", put(set_allow_follow))
        .route("/api/account", delete(delete_account))
}

// ─── User Profile ────────────────────────────────────────────

/// Get current user profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<Profile>> {
    let profile = state.store.get(&session.user_id).await?.ok_or_else(|| {
        crate::error::AppError::NotFound(format!("profile {}", session.user_id))
    })?;
    Ok(Json(profile))
}

// ─── Follow Protocol ─────────────────────────────────────────

#[derive(Deserialize)]
pub struct ProposeFollowPayload {
    /// Share code of the user to follow (their stable id).
    pub code: String,
}

#[derive(Serialize)]
pub struct ProposeFollowResponse {
    pub state: LinkState,
    /// Set when the link has not been confirmed remotely yet.
    pub notice: Option<String>,
}

/// Propose a follow by share code.
async fn propose_follow(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(payload): Json<ProposeFollowPayload>,
) -> Result<Json<ProposeFollowResponse>> {
    let link = state.follow.propose(&session, &payload.code).await?;
    let notice = match link {
        LinkState::Confirmed => None,
        LinkState::Optimistic => Some(
            "Link not saved to the server yet; it will be retried when you are back online"
                .to_string(),
        ),
    };
    Ok(Json(ProposeFollowResponse { state: link, notice }))
}

/// Pending follow requests addressed to the current user.
async fn get_follow_requests(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<FollowRequest>>> {
    let requests = state.follow.pending_requests(&session).await?;
    Ok(Json(requests))
}

/// Accept a pending follow request.
async fn accept_follow(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(requester): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.follow.accept(&session, &requester).await?;
    Ok(Json(serde_json::json!({ "accepted": requester })))
}

/// Deny (delete) a pending follow request.
async fn deny_follow(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(requester): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.follow.deny(&session, &requester).await?;
    Ok(Json(serde_json::json!({ "denied": requester })))
}

// ─── Links and Presence ──────────────────────────────────────

/// The derived, sorted view of everyone the user follows: active
/// sharers first (freshest sample on top), then inactive ids.
async fn get_links(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<TargetView>>> {
    let followed = state.follow.load_effective(&session.user_id).await?;
    state.presence.sync(&session.user_id, &followed).await?;
    Ok(Json(state.presence.tracker(&session.user_id).snapshot()))
}

/// Disconnect from a linked user.
async fn disconnect_link(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.follow.disconnect(&session, &id).await?;
    state.presence.tracker(&session.user_id).unfollow(&id);
    Ok(Json(serde_json::json!({ "disconnected": id })))
}

// ─── Live Sharing ────────────────────────────────────────────

#[derive(Serialize)]
pub struct ShareResponse {
    pub state: crate::services::ShareState,
}

async fn start_sharing(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<ShareResponse>> {
    state.publisher.start(&session).await?;
    Ok(Json(ShareResponse {
        state: state.publisher.state(&session.user_id),
    }))
}

async fn stop_sharing(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<ShareResponse>> {
    state.publisher.stop(&session).await?;
    Ok(Json(ShareResponse {
        state: state.publisher.state(&session.user_id),
    }))
}

// ─── Settings ────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AllowFollowPayload {
    pub allow: bool,
}

/// Toggle whether accepted follows auto-grant visibility. Applies to
/// future accepts only; existing grants are left as they are.
async fn set_allow_follow(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(payload): Json<AllowFollowPayload>,
) -> Result<Json<serde_json::Value>> {
    let patch = ProfilePatch {
        allow_follow: Some(payload.allow),
        ..Default::default()
    };
    state.store.set_merge(&session.user_id, patch).await?;
    Ok(Json(serde_json::json!({ "allow_follow": payload.allow })))
}

// ─── Account Deletion ────────────────────────────────────────

#[derive(Serialize)]
pub struct DeleteAccountResponse {
    pub success: bool,
    pub message: String,
}

/// Delete the profile record and the identity account.
///
/// The two deletes are not atomic; a failure after the profile delete
/// returns `deletion_incomplete` and the request can be retried.
async fn delete_account(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<DeleteAccountResponse>> {
    tracing::info!(user_id = %session.user_id, "User-initiated account deletion");

    // Tear down live state before the documents go away.
    state.publisher.abort(&session.user_id);
    state.presence.remove(&session.user_id);

    state.sessions.delete_account(&session).await?;

    Ok(Json(DeleteAccountResponse {
        success: true,
        message: "account deleted".to_string(),
    }))
}
