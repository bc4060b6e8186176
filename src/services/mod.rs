// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Business logic services.

pub mod follow;
pub mod identity;
pub mod location;
pub mod presence;
pub mod publisher;
pub mod session;

pub use follow::{FollowService, LinkState};
pub use identity::{IdentityService, Session, SessionEvent};
pub use location::{
    Coordinates, LocationSource, PermissionStatus, PositionWatch, PushLocationSource,
    WatchOptions,
};
pub use presence::{PresenceRegistry, PresenceTracker, TargetView};
pub use publisher::{SharePublisher, ShareState};
pub use session::SessionService;
