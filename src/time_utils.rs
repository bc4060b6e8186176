// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for timestamps.
//!
//! Profile and request timestamps are stored as Unix milliseconds, the
//! schema contract inherited from the mobile clients.

use chrono::Utc;

/// Current time as Unix milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_millis_is_plausible() {
        // 2020-01-01 in millis
        assert!(now_millis() > 1_577_836_800_000);
    }
}
