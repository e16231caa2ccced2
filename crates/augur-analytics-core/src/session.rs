// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session identity and sliding-window expiry.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

const ANONYMOUS_FRAGMENT: &str = "anonymous";
const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

/// Generates a session id of the form
/// `sess-{userFragment}-{epochMillis}-{random9charBase36}`.
///
/// `userFragment` is the part of `user_id` before the first `@`, or
/// `anonymous` when there is no user (or the local part is empty).
pub fn generate_session_id(user_id: Option<&str>, now: DateTime<Utc>) -> String {
	let fragment = user_id
		.and_then(|id| id.split('@').next())
		.filter(|local| !local.is_empty())
		.unwrap_or(ANONYMOUS_FRAGMENT);

	let suffix: String = (0..SUFFIX_LEN)
		.map(|_| SUFFIX_ALPHABET[fastrand::usize(..SUFFIX_ALPHABET.len())] as char)
		.collect();

	format!("sess-{fragment}-{}-{suffix}", now.timestamp_millis())
}

/// The persisted session: its id and the time of the last tracked activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
	pub session_id: String,
	/// Last activity, in epoch milliseconds.
	pub timestamp: i64,
}

impl SessionRecord {
	pub fn new(session_id: impl Into<String>, now: DateTime<Utc>) -> Self {
		Self {
			session_id: session_id.into(),
			timestamp: now.timestamp_millis(),
		}
	}

	pub fn last_activity(&self) -> Option<DateTime<Utc>> {
		Utc.timestamp_millis_opt(self.timestamp).single()
	}

	/// A session stays valid while `now - last_activity < timeout`.
	pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
		let idle_ms = now.timestamp_millis().saturating_sub(self.timestamp);
		let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
		idle_ms >= timeout_ms
	}

	/// Moves the last activity forward to `now`.
	pub fn touch(&mut self, now: DateTime<Utc>) {
		self.timestamp = now.timestamp_millis();
	}

	pub fn from_json(raw: &str) -> Result<Self> {
		let record: Self =
			serde_json::from_str(raw).map_err(|e| CoreError::MalformedSession(e.to_string()))?;
		if record.session_id.is_empty() {
			return Err(CoreError::MalformedSession("empty session id".to_string()));
		}
		Ok(record)
	}

	pub fn to_json(&self) -> Result<String> {
		Ok(serde_json::to_string(self)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn at(ms: i64) -> DateTime<Utc> {
		Utc.timestamp_millis_opt(ms).unwrap()
	}

	#[test]
	fn session_id_uses_email_local_part() {
		let id = generate_session_id(Some("alice@example.com"), at(1_700_000_000_000));
		assert!(id.starts_with("sess-alice-1700000000000-"), "{id}");
	}

	#[test]
	fn session_id_defaults_to_anonymous() {
		let now = at(42);
		assert!(generate_session_id(None, now).starts_with("sess-anonymous-42-"));
		assert!(generate_session_id(Some("@example.com"), now).starts_with("sess-anonymous-42-"));
	}

	#[test]
	fn session_ids_are_distinct() {
		let now = Utc::now();
		assert_ne!(
			generate_session_id(None, now),
			generate_session_id(None, now)
		);
	}

	#[test]
	fn record_expires_at_timeout_boundary() {
		let record = SessionRecord::new("sess-a", at(1_000));
		let timeout = Duration::from_millis(500);

		assert!(!record.is_expired(at(1_000), timeout));
		assert!(!record.is_expired(at(1_499), timeout));
		assert!(record.is_expired(at(1_500), timeout));
	}

	#[test]
	fn touch_slides_the_window() {
		let mut record = SessionRecord::new("sess-a", at(0));
		let timeout = Duration::from_millis(100);

		record.touch(at(90));
		assert!(!record.is_expired(at(180), timeout));
		assert!(record.is_expired(at(190), timeout));
	}

	#[test]
	fn record_uses_camel_case_json() {
		let record = SessionRecord::new("sess-a", at(5));
		let json = record.to_json().unwrap();
		assert_eq!(json, r#"{"sessionId":"sess-a","timestamp":5}"#);
		assert_eq!(SessionRecord::from_json(&json).unwrap(), record);
	}

	#[test]
	fn malformed_records_are_rejected() {
		assert!(matches!(
			SessionRecord::from_json("not json"),
			Err(CoreError::MalformedSession(_))
		));
		assert!(matches!(
			SessionRecord::from_json(r#"{"sessionId":"","timestamp":1}"#),
			Err(CoreError::MalformedSession(_))
		));
	}

	proptest! {
		#[test]
		fn session_id_has_expected_shape(local in "[a-z0-9._]{1,20}", ms in 0i64..4_000_000_000_000) {
			let id = generate_session_id(Some(&format!("{local}@host")), at(ms));
			let prefix = format!("sess-{local}-{ms}-");
			prop_assert!(id.starts_with(&prefix));
			let suffix = &id[prefix.len()..];
			prop_assert_eq!(suffix.len(), 9);
			prop_assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
		}
	}
}
