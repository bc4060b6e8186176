// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Follow-request consent protocol.
//!
//! The state machine that decides who may see whose location: propose,
//! accept, deny, disconnect, and the post-accept verify step. The two
//! sides of a link live in two independently-owned documents, so every
//! operation treats the acting user's own document as authoritative and
//! the counterpart's mirrored fields as best-effort. Mirrored-write
//! failures are classified once (by whose document was targeted) and
//! swallowed; own-document failures always propagate.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::cache::{merge_followed, ShadowCache};
use crate::error::{AppError, Result};
use crate::models::profile::{set_insert, set_remove};
use crate::models::{FollowRequest, GeoSample, ProfilePatch, RequestStatus};
use crate::services::identity::Session;
use crate::services::location::LocationSource;
use crate::services::publisher::SharePublisher;
use crate::store::ProfileStore;
use crate::time_utils::now_millis;

/// Two-phase link state: `Optimistic` while the local followed-set has
/// been updated but the remote write is unconfirmed, `Confirmed` once
/// the owner's own document reflects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Optimistic,
    Confirmed,
}

pub struct FollowService {
    store: Arc<dyn ProfileStore>,
    shadow: ShadowCache,
    publisher: Arc<SharePublisher>,
    source: Arc<dyn LocationSource>,
    trial_days: i64,
    /// (owner, target) -> link state for this process.
    links: DashMap<(String, String), LinkState>,
}

impl FollowService {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        shadow: ShadowCache,
        publisher: Arc<SharePublisher>,
        source: Arc<dyn LocationSource>,
        trial_days: i64,
    ) -> Self {
        Self {
            store,
            shadow,
            publisher,
            source,
            trial_days,
            links: DashMap::new(),
        }
    }

    /// Effective followed-set for `owner`: remote ∪ local shadow copy,
    /// written straight back to the shadow cache.
    pub async fn load_effective(&self, owner: &str) -> Result<BTreeSet<String>> {
        let remote = self
            .store
            .get(owner)
            .await?
            .map(|p| p.followed_users)
            .unwrap_or_default();
        let local = self.shadow.load(owner);
        let merged = merge_followed(&remote, &local);
        self.shadow.save(owner, &merged);
        Ok(merged)
    }

    /// Current link state for an (owner, target) pair, if tracked.
    pub fn link_state(&self, owner: &str, target: &str) -> Option<LinkState> {
        self.links
            .get(&(owner.to_string(), target.to_string()))
            .map(|s| *s)
    }

    /// Propose a follow: requester asks to view `code`'s location.
    ///
    /// Preconditions are rejected synchronously before any network
    /// call. On success the local followed-set is updated optimistically
    /// and the returned state says whether the owner's own document
    /// confirmed the write.
    pub async fn propose(&self, session: &Session, code: &str) -> Result<LinkState> {
        let owner = session.user_id.as_str();
        let target = code.trim();

        if target.is_empty() {
            return Err(AppError::Precondition("share code is empty".to_string()));
        }
        if target == owner {
            return Err(AppError::Precondition(
                "you cannot follow yourself".to_string(),
            ));
        }

        let me = self
            .store
            .get(owner)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("profile {}", owner)))?;
        if !me.has_entitlement(now_millis(), self.trial_days) {
            return Err(AppError::Precondition(
                "an active plan or trial is required to link".to_string(),
            ));
        }

        let effective = self.load_effective(owner).await?;
        if effective.contains(target) {
            return Err(AppError::Precondition(format!(
                "already following {}",
                target
            )));
        }

        // Optimistic local add before any remote confirmation; the UI
        // must reflect "connecting" immediately.
        let mut optimistic = effective;
        optimistic.insert(target.to_string());
        self.shadow.save(owner, &optimistic);
        self.links.insert(
            (owner.to_string(), target.to_string()),
            LinkState::Optimistic,
        );

        let request = FollowRequest::pending(owner, now_millis());
        if let Err(err) = self.store.put_request(target, owner, &request).await {
            if err.ignorable_on_mirror() {
                tracing::warn!(owner, target_id = target, error = %err,
                    "Follow request write deferred");
            } else {
                // Roll the optimistic add back; the propose failed outright.
                let mut rollback = self.shadow.load(owner);
                rollback.remove(target);
                self.shadow.save(owner, &rollback);
                self.links.remove(&(owner.to_string(), target.to_string()));
                return Err(err);
            }
        }

        // Own-document followed_users add. Offline is tolerated: the
        // link stays optimistic and verify() reports it later.
        let mut followed = me.followed_users.clone();
        set_insert(&mut followed, target);
        let patch = ProfilePatch {
            followed_users: Some(followed),
            ..Default::default()
        };
        let state = match self.store.set_merge(owner, patch).await {
            Ok(()) => LinkState::Confirmed,
            Err(err) if err.ignorable_on_mirror() => {
                tracing::warn!(owner, target_id = target, error = %err,
                    "Own followed_users write pending, link stays optimistic");
                LinkState::Optimistic
            }
            Err(err) => return Err(err),
        };

        // Best-effort: seed our own last-known location so the target
        // has something to display right after accepting.
        if me.location.is_none() {
            if let Ok(pos) = self.source.current_position(owner).await {
                let seed = ProfilePatch {
                    location: Some(GeoSample {
                        lat: pos.lat,
                        lng: pos.lng,
                        last_updated: now_millis(),
                    }),
                    ..Default::default()
                };
                if let Err(err) = self.store.set_merge(owner, seed).await {
                    tracing::debug!(owner, error = %err, "Location seed skipped");
                }
            }
        }

        self.links
            .insert((owner.to_string(), target.to_string()), state);
        tracing::info!(owner, target_id = target, state = ?state, "Follow proposed");
        Ok(state)
    }

    /// Accept a pending request. Safe to invoke twice; the second call
    /// finds nothing left to write.
    pub async fn accept(&self, session: &Session, requester: &str) -> Result<()> {
        let me_id = session.user_id.as_str();

        let request = self
            .store
            .get_request(me_id, requester)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("request from {}", requester)))?;

        // (a) Own document: always attempted, always authoritative.
        let mut me = self
            .store
            .get(me_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("profile {}", me_id)))?;
        let mut changed = set_insert(&mut me.followed_users, requester);
        changed |= set_insert(&mut me.visible_to, requester);
        if changed {
            let patch = ProfilePatch {
                followed_users: Some(me.followed_users.clone()),
                visible_to: Some(me.visible_to.clone()),
                ..Default::default()
            };
            self.store.set_merge(me_id, patch).await?;
        }

        // (b) Mirrored add on the requester's document, read-before-write.
        // We may lack write permission there; that failure is swallowed.
        if let Some(other) = self.store.get(requester).await? {
            let need_follow = !other.follows(me_id);
            // Visibility is only auto-granted while the requester's
            // consent policy allows it; no retroactive changes later.
            let need_visible = !other.grants_visibility_to(me_id) && other.allow_follow;
            if need_follow || need_visible {
                let mut followed = other.followed_users.clone();
                let mut visible = other.visible_to.clone();
                if need_follow {
                    set_insert(&mut followed, me_id);
                }
                if need_visible {
                    set_insert(&mut visible, me_id);
                }
                let patch = ProfilePatch {
                    followed_users: Some(followed),
                    visible_to: Some(visible),
                    ..Default::default()
                };
                match self.store.set_merge(requester, patch).await {
                    Ok(()) => {}
                    Err(err) if err.ignorable_on_mirror() => {
                        tracing::warn!(user_id = me_id, requester, error = %err,
                            "Mirrored accept write failed, continuing");
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        // (c) Mark accepted; the record is retained so access rules
        // keyed on its existence keep permitting the requester's reads.
        if request.status == RequestStatus::Pending {
            self.store
                .set_request_status(me_id, requester, RequestStatus::Accepted)
                .await?;
        }

        // (d) Local followed-set.
        let mut local = self.shadow.load(me_id);
        if local.insert(requester.to_string()) {
            self.shadow.save(me_id, &local);
        }
        self.links.insert(
            (me_id.to_string(), requester.to_string()),
            LinkState::Confirmed,
        );

        // (e) Courtesy: start outbound sharing so the requester sees a
        // live point immediately. Failure (no permission, no plan) is
        // not the accept's problem.
        if let Err(err) = self.publisher.start(session).await {
            tracing::debug!(user_id = me_id, error = %err,
                "Courtesy share start skipped");
        }

        tracing::info!(user_id = me_id, requester, "Follow request accepted");
        Ok(())
    }

    /// Deny a pending request: the record is deleted, nothing else
    /// changes on either side.
    pub async fn deny(&self, session: &Session, requester: &str) -> Result<()> {
        self.store
            .delete_request(&session.user_id, requester)
            .await?;
        tracing::info!(user_id = %session.user_id, requester, "Follow request denied");
        Ok(())
    }

    /// Unilateral disconnect. The acting user's own document is the
    /// success criterion; the mirrored removal on the other party's
    /// document is best-effort.
    pub async fn disconnect(&self, session: &Session, other_id: &str) -> Result<()> {
        let me_id = session.user_id.as_str();

        let mut me = self
            .store
            .get(me_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("profile {}", me_id)))?;
        let mut changed = set_remove(&mut me.followed_users, other_id);
        changed |= set_remove(&mut me.visible_to, other_id);
        if changed {
            let patch = ProfilePatch {
                followed_users: Some(me.followed_users.clone()),
                visible_to: Some(me.visible_to.clone()),
                ..Default::default()
            };
            self.store.set_merge(me_id, patch).await?;
        }

        if let Some(mut other) = self.store.get(other_id).await? {
            let mut mirror_changed = set_remove(&mut other.followed_users, me_id);
            mirror_changed |= set_remove(&mut other.visible_to, me_id);
            if mirror_changed {
                let patch = ProfilePatch {
                    followed_users: Some(other.followed_users.clone()),
                    visible_to: Some(other.visible_to.clone()),
                    ..Default::default()
                };
                match self.store.set_merge(other_id, patch).await {
                    Ok(()) => {}
                    Err(err) if err.ignorable_on_mirror() => {
                        tracing::warn!(owner = me_id, other = other_id, error = %err,
                            "Mirrored disconnect write failed, state left asymmetric");
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        // Explicit disconnect is the one operation allowed to shrink
        // the local shadow copy.
        let mut local = self.shadow.load(me_id);
        if local.remove(other_id) {
            self.shadow.save(me_id, &local);
        }
        self.links
            .remove(&(me_id.to_string(), other_id.to_string()));

        tracing::info!(owner = me_id, other = other_id, "Disconnected");
        Ok(())
    }

    /// Post-accept sanity check on the requester side: bounded re-read
    /// of the own document. `Optimistic` means the link has not been
    /// saved remotely yet and the user should retry with connectivity.
    pub async fn verify(&self, session: &Session, target: &str) -> Result<LinkState> {
        let owner = session.user_id.as_str();
        let confirmed = self
            .store
            .get(owner)
            .await?
            .map(|p| p.follows(target))
            .unwrap_or(false);

        let state = if confirmed {
            LinkState::Confirmed
        } else {
            LinkState::Optimistic
        };
        self.links
            .insert((owner.to_string(), target.to_string()), state);
        Ok(state)
    }

    /// Pending requests proposed to this user.
    pub async fn pending_requests(&self, session: &Session) -> Result<Vec<FollowRequest>> {
        self.store.pending_requests_for(&session.user_id).await
    }
}
