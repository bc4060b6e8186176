// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile model for storage and API.
//!
//! Field names are the schema contract shared with the mobile clients;
//! changing them breaks every deployed app build.

use serde::{Deserialize, Serialize};

/// A single location sample. Overwritten in place, no history retained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoSample {
    pub lat: f64,
    pub lng: f64,
    /// Unix milliseconds of the sample.
    pub last_updated: i64,
}

/// User profile stored in Firestore, one document per account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Stable user id issued by the identity provider (also the document ID)
    pub id: String,
    /// Display name shown to linked users
    pub display_name: String,
    /// Email address
    pub email: String,
    /// True while the owner is actively broadcasting location
    pub sharing_enabled: bool,
    /// Last known location sample
    pub location: Option<GeoSample>,
    /// Ids this user has chosen to follow (set semantics)
    pub followed_users: Vec<String>,
    /// Ids permitted to view this user's location while sharing.
    /// Only ever contains ids this user's consent policy approved.
    pub visible_to: Vec<String>,
    /// When false, new followers are not auto-granted visibility
    pub allow_follow: bool,
    /// Immutable creation timestamp (Unix milliseconds). Legacy
    /// documents may lack the field; zero means "needs backfill".
    #[serde(default)]
    pub created_at: i64,
    /// Billing plan, if any. Presence is the entitlement signal.
    pub plan_title: Option<String>,
}

impl Profile {
    /// A fresh profile with the default field values written at signup.
    pub fn with_defaults(id: &str, display_name: &str, email: &str, created_at: i64) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            email: email.to_string(),
            sharing_enabled: false,
            location: None,
            followed_users: Vec::new(),
            visible_to: Vec::new(),
            allow_follow: true,
            created_at,
            plan_title: None,
        }
    }

    pub fn follows(&self, id: &str) -> bool {
        self.followed_users.iter().any(|u| u == id)
    }

    pub fn grants_visibility_to(&self, id: &str) -> bool {
        self.visible_to.iter().any(|u| u == id)
    }

    /// Whether `viewer` may currently render this profile's location.
    /// Requires both the sharing flag and a granted `visible_to` entry;
    /// being followed by the viewer is not sufficient.
    pub fn renderable_by(&self, viewer: &str) -> bool {
        self.sharing_enabled && self.location.is_some() && self.grants_visibility_to(viewer)
    }

    /// Entitlement predicate: a paid plan, or within the trial window
    /// measured from account creation.
    pub fn has_entitlement(&self, now_millis: i64, trial_days: i64) -> bool {
        if self.plan_title.is_some() {
            return true;
        }
        now_millis.saturating_sub(self.created_at) <= trial_days * 86_400_000
    }
}

/// Idempotent set insertion for the set-valued profile fields.
pub fn set_insert(list: &mut Vec<String>, id: &str) -> bool {
    if list.iter().any(|u| u == id) {
        return false;
    }
    list.push(id.to_string());
    true
}

/// Set removal; returns whether the id was present.
pub fn set_remove(list: &mut Vec<String>, id: &str) -> bool {
    let before = list.len();
    list.retain(|u| u != id);
    list.len() != before
}

/// Partial profile update. `None` fields are left untouched by a merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    pub sharing_enabled: Option<bool>,
    pub location: Option<GeoSample>,
    pub followed_users: Option<Vec<String>>,
    pub visible_to: Option<Vec<String>>,
    pub allow_follow: Option<bool>,
    pub created_at: Option<i64>,
    pub plan_title: Option<String>,
}

impl ProfilePatch {
    /// Apply this patch onto an existing profile.
    pub fn apply_to(&self, profile: &mut Profile) {
        if let Some(v) = &self.display_name {
            profile.display_name = v.clone();
        }
        if let Some(v) = self.sharing_enabled {
            profile.sharing_enabled = v;
        }
        if let Some(v) = self.location {
            profile.location = Some(v);
        }
        if let Some(v) = &self.followed_users {
            profile.followed_users = v.clone();
        }
        if let Some(v) = &self.visible_to {
            profile.visible_to = v.clone();
        }
        if let Some(v) = self.allow_follow {
            profile.allow_follow = v;
        }
        if let Some(v) = self.created_at {
            profile.created_at = v;
        }
        if let Some(v) = &self.plan_title {
            profile.plan_title = Some(v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str) -> Profile {
        Profile::with_defaults(id, "Test", "test@example.com", 0)
    }

    #[test]
    fn test_set_insert_is_idempotent() {
        let mut list = Vec::new();
        assert!(set_insert(&mut list, "a"));
        assert!(!set_insert(&mut list, "a"));
        assert_eq!(list, vec!["a"]);
    }

    #[test]
    fn test_renderable_requires_sharing_and_grant() {
        let mut p = profile("b");
        p.location = Some(GeoSample {
            lat: 37.0,
            lng: -122.0,
            last_updated: 1,
        });

        // granted but not sharing
        p.visible_to = vec!["v".to_string()];
        p.sharing_enabled = false;
        assert!(!p.renderable_by("v"));

        // sharing but not granted
        p.sharing_enabled = true;
        p.visible_to.clear();
        assert!(!p.renderable_by("v"));

        // both
        p.visible_to = vec!["v".to_string()];
        assert!(p.renderable_by("v"));
    }

    #[test]
    fn test_entitlement_trial_window() {
        let mut p = profile("a");
        p.created_at = 0;
        assert!(p.has_entitlement(13 * 86_400_000, 14));
        assert!(!p.has_entitlement(15 * 86_400_000, 14));

        p.plan_title = Some("Family".to_string());
        assert!(p.has_entitlement(15 * 86_400_000, 14));
    }

    #[test]
    fn test_patch_merge_leaves_unset_fields() {
        let mut p = profile("a");
        p.followed_users = vec!["b".to_string()];

        let patch = ProfilePatch {
            sharing_enabled: Some(true),
            ..Default::default()
        };
        patch.apply_to(&mut p);

        assert!(p.sharing_enabled);
        assert_eq!(p.followed_users, vec!["b"]);
        assert!(p.allow_follow);
    }
}
