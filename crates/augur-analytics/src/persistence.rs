// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable records of batches that exhausted their retries.
//!
//! Failed events are appended to `augur_events_{sessionId}`, keeping only
//! the most recent [`MAX_PERSISTED_EVENTS`]. Every new client drains all
//! such records, whatever session wrote them, through the transport once.

use std::sync::Arc;

use tokio::sync::Mutex;

use augur_analytics_core::keys::{events_key, session_id_from_events_key, MAX_PERSISTED_EVENTS};
use augur_analytics_core::{decode_batch, encode_batch, EventPayload};
use tracing::{debug, info};

use crate::error::Result;
use crate::storage::KeyValueStore;
use crate::transport::Transport;

/// Summary of one startup drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
	/// Events accepted by the endpoint.
	pub delivered: usize,
	/// Records removed, including unreadable ones.
	pub records_cleared: usize,
	/// Records left for the next startup.
	pub records_retained: usize,
}

/// Failed-delivery records in a [`KeyValueStore`].
///
/// Clones share one lock around every read-modify-write of a record, so a
/// persist never interleaves with the drain rewriting the same key.
#[derive(Debug, Clone)]
pub struct OfflineStore {
	store: Arc<dyn KeyValueStore>,
	max_events: usize,
	records: Arc<Mutex<()>>,
}

impl OfflineStore {
	pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
		Self {
			store,
			max_events: MAX_PERSISTED_EVENTS,
			records: Arc::new(Mutex::new(())),
		}
	}

	/// Appends `events` to the session's record, dropping the oldest events
	/// beyond the cap.
	pub async fn persist(&self, session_id: &str, events: &[EventPayload]) -> Result<()> {
		let key = events_key(session_id);
		let _records = self.records.lock().await;
		let mut record = self.load(session_id).await?;
		record.extend_from_slice(events);

		if record.len() > self.max_events {
			let excess = record.len() - self.max_events;
			record.drain(..excess);
			debug!(session_id, dropped = excess, "Failed-delivery record truncated");
		}

		self.store.set(&key, &encode_batch(&record)?).await?;
		debug!(session_id, count = record.len(), "Persisted failed events");
		Ok(())
	}

	/// The record for `session_id`; empty when absent or unreadable.
	pub async fn load(&self, session_id: &str) -> Result<Vec<EventPayload>> {
		let key = events_key(session_id);
		let Some(raw) = self.store.get(&key).await? else {
			return Ok(Vec::new());
		};
		match decode_batch(&raw) {
			Ok(events) => Ok(events),
			Err(e) => {
				debug!(session_id, error = %e, "Discarding unreadable failed-delivery record");
				Ok(Vec::new())
			}
		}
	}

	/// Session ids that currently have a record.
	pub async fn sessions(&self) -> Result<Vec<String>> {
		let mut sessions: Vec<String> = self
			.store
			.keys()
			.await?
			.iter()
			.filter_map(|key| session_id_from_events_key(key))
			.map(str::to_string)
			.collect();
		sessions.sort();
		Ok(sessions)
	}

	pub async fn remove(&self, session_id: &str) -> Result<()> {
		self.store.remove(&events_key(session_id)).await?;
		Ok(())
	}

	/// Re-submits every record once. Delivered records are removed, failed
	/// ones are kept as they are for the next startup.
	///
	/// The lock is released while a record is being sent, so failed batches
	/// can still be persisted during a slow drain.
	pub async fn drain(&self, transport: &Transport) -> Result<DrainReport> {
		let mut report = DrainReport::default();

		for session_id in self.sessions().await? {
			let events = {
				let _records = self.records.lock().await;
				let events = self.load(&session_id).await?;
				if events.is_empty() {
					self.remove(&session_id).await?;
				}
				events
			};
			if events.is_empty() {
				report.records_cleared += 1;
				continue;
			}

			match transport.send(&events).await {
				Ok(()) => {
					report.delivered += events.len();
					self.remove_delivered(&session_id, &events).await?;
					report.records_cleared += 1;
				}
				Err(e) => {
					debug!(session_id = %session_id, error = %e, "Failed-delivery record kept for next startup");
					report.records_retained += 1;
				}
			}
		}

		if report.delivered > 0 || report.records_retained > 0 {
			info!(
				delivered = report.delivered,
				records_cleared = report.records_cleared,
				records_retained = report.records_retained,
				"Drained persisted analytics events"
			);
		}
		Ok(report)
	}

	/// Removes the delivered events, keeping anything persisted for the same
	/// session while they were being sent.
	async fn remove_delivered(&self, session_id: &str, delivered: &[EventPayload]) -> Result<()> {
		let _records = self.records.lock().await;
		let current = self.load(session_id).await?;
		let remainder = undelivered(&current, delivered);
		if remainder.is_empty() {
			return self.remove(session_id).await;
		}

		debug!(session_id, kept = remainder.len(), "Keeping events persisted during drain");
		self
			.store
			.set(&events_key(session_id), &encode_batch(remainder)?)
			.await?;
		Ok(())
	}
}

/// The part of `current` appended after `delivered` was read.
///
/// Appends may have pushed the oldest delivered events past the cap, so the
/// record starts with some tail of `delivered` (possibly empty) followed by
/// the new events.
fn undelivered<'a>(current: &'a [EventPayload], delivered: &[EventPayload]) -> &'a [EventPayload] {
	let overlap = (0..=delivered.len())
		.map(|skip| &delivered[skip..])
		.find(|tail| current.starts_with(tail))
		.map_or(0, <[EventPayload]>::len);
	&current[overlap..]
}
