// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client configuration.
//!
//! [`ClientConfig`] deserializes from the camelCase init object hosts already
//! hand to browser trackers (`{"writeKey": ..., "batchSize": 20}`); every
//! field has a default, durations are given in milliseconds.

use std::time::Duration;

use augur_common_http::RetryConfig;
use serde::{Deserialize, Serialize};

use crate::batch::BatchConfig;

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_millis(1_800_000);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(1_000);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Immutable per-instance settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
	pub write_key: String,
	/// Base URL of the ingestion service, without the events path.
	pub endpoint: String,
	pub user_id: Option<String>,
	/// Forces this session id instead of resuming or generating one.
	pub session_id: Option<String>,
	pub feed_id: Option<String>,
	pub batch_size: usize,
	#[serde(with = "duration_ms")]
	pub batch_timeout: Duration,
	#[serde(with = "duration_ms")]
	pub session_timeout: Duration,
	pub max_retries: u32,
	/// Delay unit for retries: attempt `n` is followed by `n * retry_base_delay`.
	#[serde(with = "duration_ms")]
	pub retry_base_delay: Duration,
	#[serde(with = "duration_ms")]
	pub request_timeout: Duration,
	pub enable_persistence: bool,
	pub debug: bool,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			write_key: String::new(),
			endpoint: String::new(),
			user_id: None,
			session_id: None,
			feed_id: None,
			batch_size: DEFAULT_BATCH_SIZE,
			batch_timeout: DEFAULT_BATCH_TIMEOUT,
			session_timeout: DEFAULT_SESSION_TIMEOUT,
			max_retries: DEFAULT_MAX_RETRIES,
			retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			enable_persistence: true,
			debug: false,
		}
	}
}

impl ClientConfig {
	pub fn batch_config(&self) -> BatchConfig {
		BatchConfig {
			batch_size: self.batch_size.max(1),
			batch_timeout: self.batch_timeout,
		}
	}

	/// `max_retries + 1` attempts with linearly growing delays.
	pub fn retry_config(&self) -> RetryConfig {
		RetryConfig::linear(self.max_retries.saturating_add(1), self.retry_base_delay)
	}
}

mod duration_ms {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use augur_common_http::Backoff;

	#[test]
	fn test_defaults() {
		let config = ClientConfig::default();
		assert_eq!(config.batch_size, 10);
		assert_eq!(config.batch_timeout, Duration::from_millis(5000));
		assert_eq!(config.session_timeout, Duration::from_millis(1_800_000));
		assert_eq!(config.max_retries, 3);
		assert!(config.enable_persistence);
		assert!(!config.debug);
		assert!(config.feed_id.is_none());
	}

	#[test]
	fn test_deserialize_camel_case_init_object() {
		let config: ClientConfig = serde_json::from_str(
			r#"{
				"writeKey": "wk_123",
				"endpoint": "https://ingest.example.com",
				"feedId": "F1",
				"batchSize": 25,
				"batchTimeout": 1000,
				"enablePersistence": false,
				"debug": true
			}"#,
		)
		.unwrap();

		assert_eq!(config.write_key, "wk_123");
		assert_eq!(config.feed_id.as_deref(), Some("F1"));
		assert_eq!(config.batch_size, 25);
		assert_eq!(config.batch_timeout, Duration::from_millis(1000));
		assert!(!config.enable_persistence);
		assert!(config.debug);
		// untouched fields keep their defaults
		assert_eq!(config.max_retries, 3);
		assert_eq!(config.session_timeout, DEFAULT_SESSION_TIMEOUT);
	}

	#[test]
	fn test_retry_config_allows_max_retries_plus_one_attempts() {
		let config = ClientConfig {
			max_retries: 3,
			..Default::default()
		};
		let retry = config.retry_config();
		assert_eq!(retry.max_attempts, 4);
		assert_eq!(retry.base_delay, Duration::from_secs(1));
		assert_eq!(retry.backoff, Backoff::Linear);
		assert!(!retry.jitter);
	}

	#[test]
	fn test_zero_batch_size_is_clamped() {
		let config = ClientConfig {
			batch_size: 0,
			..Default::default()
		};
		assert_eq!(config.batch_config().batch_size, 1);
	}
}
