// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod account;
pub mod profile;
pub mod request;

pub use account::Account;
pub use profile::{GeoSample, Profile, ProfilePatch};
pub use request::{FollowRequest, RequestStatus};
