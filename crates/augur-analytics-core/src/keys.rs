// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable storage layout.
//!
//! | Key | Value |
//! |-----|-------|
//! | `augur_session` | `{ "sessionId": ..., "timestamp": epochMillis }` |
//! | `augur_events_{sessionId}` | JSON array of failed [`EventPayload`](crate::EventPayload)s |

/// Key holding the current [`SessionRecord`](crate::SessionRecord).
pub const SESSION_KEY: &str = "augur_session";

/// Prefix of every failed-delivery record.
pub const EVENTS_KEY_PREFIX: &str = "augur_events_";

/// Maximum number of events kept in one failed-delivery record.
pub const MAX_PERSISTED_EVENTS: usize = 100;

/// Storage key for the failed-delivery record of `session_id`.
pub fn events_key(session_id: &str) -> String {
	format!("{EVENTS_KEY_PREFIX}{session_id}")
}

/// Session id encoded in a failed-delivery record key, if `key` is one.
pub fn session_id_from_events_key(key: &str) -> Option<&str> {
	key.strip_prefix(EVENTS_KEY_PREFIX).filter(|id| !id.is_empty())
}
