// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Batch delivery to the ingestion endpoint.
//!
//! Each attempt first offers the batch to the host's [`BeaconChannel`], if
//! one is configured, and falls through to an HTTP POST when the beacon
//! refuses it. Failed attempts are retried with linearly growing delays.

use std::sync::Arc;

use augur_analytics_core::{encode_batch, EventPayload};
use augur_common_http::{retry, InterceptedClient, RetryConfig};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;

use crate::error::{AnalyticsError, Result};

/// Largest body [`DetachedBeacon`] accepts.
pub const MAX_BEACON_PAYLOAD_BYTES: usize = 64 * 1024;

/// A fire-and-forget channel that keeps working while the host tears down.
///
/// Returning `true` means the channel took ownership of the body; the send
/// itself is never observed.
pub trait BeaconChannel: Send + Sync {
	fn send_beacon(&self, url: &str, body: &str) -> bool;
}

/// Beacon backed by a detached tokio task.
///
/// The request goes out on the bare client, so it carries no interceptor
/// headers.
#[derive(Debug, Clone)]
pub struct DetachedBeacon {
	client: Client,
	max_payload_bytes: usize,
}

impl DetachedBeacon {
	pub fn new(client: Client) -> Self {
		Self {
			client,
			max_payload_bytes: MAX_BEACON_PAYLOAD_BYTES,
		}
	}

	pub fn with_max_payload_bytes(mut self, max_payload_bytes: usize) -> Self {
		self.max_payload_bytes = max_payload_bytes;
		self
	}
}

impl BeaconChannel for DetachedBeacon {
	fn send_beacon(&self, url: &str, body: &str) -> bool {
		if body.len() > self.max_payload_bytes {
			debug!(
				bytes = body.len(),
				limit = self.max_payload_bytes,
				"Beacon payload too large"
			);
			return false;
		}

		let Ok(handle) = tokio::runtime::Handle::try_current() else {
			return false;
		};

		let request = self
			.client
			.post(url)
			.header(CONTENT_TYPE, "application/json")
			.body(body.to_string());
		handle.spawn(async move {
			if let Err(e) = request.send().await {
				debug!(error = %e, "Beacon request failed");
			}
		});
		true
	}
}

/// POSTs the batch through the instance's intercepted client.
#[derive(Debug, Clone)]
pub struct HttpChannel {
	client: InterceptedClient,
	url: String,
}

impl HttpChannel {
	pub fn new(client: InterceptedClient, url: impl Into<String>) -> Self {
		Self {
			client,
			url: url.into(),
		}
	}

	pub fn url(&self) -> &str {
		&self.url
	}

	/// One POST. Any non-2xx status is an error.
	pub async fn post(&self, body: &str) -> Result<()> {
		let response = self
			.client
			.post(&self.url)
			.header(CONTENT_TYPE, "application/json")
			.body(body.to_string())
			.send()
			.await?;

		let status = response.status();
		if status.is_success() {
			return Ok(());
		}

		let message = response.text().await.unwrap_or_default();
		Err(AnalyticsError::ServerError {
			status: status.as_u16(),
			message,
		})
	}
}

/// Delivers batches with retry.
pub struct Transport {
	http: HttpChannel,
	beacon: Option<Arc<dyn BeaconChannel>>,
	retry: RetryConfig,
}

impl Transport {
	pub fn new(http: HttpChannel, beacon: Option<Arc<dyn BeaconChannel>>, retry: RetryConfig) -> Self {
		Self {
			http,
			beacon,
			retry,
		}
	}

	/// Sends `events` as one JSON array, trying up to `max_attempts` times.
	pub async fn send(&self, events: &[EventPayload]) -> Result<()> {
		if events.is_empty() {
			return Ok(());
		}

		let body = encode_batch(events)?;
		retry(&self.retry, || self.attempt(&body)).await?;

		debug!(count = events.len(), "Analytics batch delivered");
		Ok(())
	}

	async fn attempt(&self, body: &str) -> Result<()> {
		if let Some(beacon) = &self.beacon {
			if beacon.send_beacon(self.http.url(), body) {
				return Ok(());
			}
			debug!("Beacon refused batch, sending over HTTP");
		}

		self.http.post(body).await
	}
}
