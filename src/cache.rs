// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-device shadow cache of the owner's followed-set.
//!
//! The remote `followed_users` field is the source of truth, but a
//! follow added while offline must survive a relaunch before the write
//! flushes. On every load the engine unions local and remote and writes
//! the union straight back; the local set only ever shrinks through an
//! explicit disconnect.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

/// Persisted local key-value store of followed-sets, namespaced
/// `followed:{owner}`.
#[derive(Clone)]
pub struct ShadowCache {
    backing: Backing,
}

#[derive(Clone)]
enum Backing {
    /// One JSON file per key under a directory.
    Dir(PathBuf),
    /// In-process map for tests.
    Memory(Arc<DashMap<String, String>>),
}

fn key_for(owner: &str) -> String {
    format!("followed:{}", owner)
}

impl ShadowCache {
    pub fn new_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::Dir(dir.into()),
        }
    }

    pub fn new_memory() -> Self {
        Self {
            backing: Backing::Memory(Arc::new(DashMap::new())),
        }
    }

    /// Load the cached followed-set for `owner`. Missing or corrupt
    /// entries read as empty; the cache is advisory, never fatal.
    pub fn load(&self, owner: &str) -> BTreeSet<String> {
        let raw = match &self.backing {
            Backing::Dir(dir) => {
                let path = dir.join(Self::file_name(owner));
                std::fs::read_to_string(path).ok()
            }
            Backing::Memory(map) => map.get(&key_for(owner)).map(|v| v.clone()),
        };
        raw.and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Persist the followed-set for `owner`. Write failures are logged
    /// and swallowed; losing the shadow copy only costs availability.
    pub fn save(&self, owner: &str, followed: &BTreeSet<String>) {
        let json = match serde_json::to_string(followed) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(owner, error = %err, "Failed to encode shadow cache");
                return;
            }
        };
        match &self.backing {
            Backing::Dir(dir) => {
                if let Err(err) = std::fs::create_dir_all(dir) {
                    tracing::warn!(owner, error = %err, "Failed to create shadow cache dir");
                    return;
                }
                let path = dir.join(Self::file_name(owner));
                if let Err(err) = std::fs::write(&path, json) {
                    tracing::warn!(owner, error = %err, "Failed to write shadow cache");
                }
            }
            Backing::Memory(map) => {
                map.insert(key_for(owner), json);
            }
        }
    }

    fn file_name(owner: &str) -> String {
        // Owner ids are opaque; encode so any id is filesystem-safe.
        format!("{}.json", urlencoding::encode(&key_for(owner)))
    }
}

/// Effective followed-set: the union of the remote value and the local
/// shadow copy. Availability over consistency; the union only grows
/// until a remote read confirms convergence.
pub fn merge_followed(remote: &[String], local: &BTreeSet<String>) -> BTreeSet<String> {
    let mut merged: BTreeSet<String> = remote.iter().cloned().collect();
    merged.extend(local.iter().cloned());
    merged
}
