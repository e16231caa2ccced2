// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The event payload posted to the ingestion endpoint.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Ingestion path, appended to the configured endpoint.
pub const EVENTS_PATH: &str = "/api/v1/analytics/events";

/// Value of the `source` field on every payload sent by this client.
pub const EVENT_SOURCE: &str = "frontend";

/// One tracked event, as posted in the JSON array body.
///
/// `properties` always carries `session_id`, `user_id`, `timestamp` and
/// `device_info` next to the caller's own properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
	pub write_key: String,
	pub session_id: String,
	pub event_type: String,
	pub event_name: String,
	#[serde(default)]
	pub event_description: String,
	#[serde(default)]
	pub properties: serde_json::Value,
	#[serde(default = "default_source")]
	pub source: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub feed_id: Option<String>,
}

fn default_source() -> String {
	EVENT_SOURCE.to_string()
}

impl EventPayload {
	/// Creates a payload whose name equals its type and with no description.
	pub fn new(
		write_key: impl Into<String>,
		session_id: impl Into<String>,
		event_type: impl Into<String>,
	) -> Self {
		let event_type = event_type.into();
		Self {
			write_key: write_key.into(),
			session_id: session_id.into(),
			event_name: event_type.clone(),
			event_type,
			event_description: String::new(),
			properties: serde_json::json!({}),
			source: default_source(),
			feed_id: None,
		}
	}

	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.event_name = name.into();
		self
	}

	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.event_description = description.into();
		self
	}

	pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
		self.properties = properties;
		self
	}

	pub fn with_feed_id(mut self, feed_id: Option<String>) -> Self {
		self.feed_id = feed_id;
		self
	}
}

/// Serializes a batch as the JSON array body.
pub fn encode_batch(events: &[EventPayload]) -> Result<String> {
	Ok(serde_json::to_string(events)?)
}

/// Parses a persisted failed-delivery record.
pub fn decode_batch(raw: &str) -> Result<Vec<EventPayload>> {
	serde_json::from_str(raw).map_err(|e| CoreError::MalformedEvents(e.to_string()))
}
