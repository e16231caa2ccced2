// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session identity with a sliding-window timeout.
//!
//! The session survives indefinitely under continuous activity and expires
//! after `timeout` of silence. The current record is mirrored to the
//! `augur_session` storage key on every change so a reload within the
//! timeout resumes the same session. Storage failures are logged at debug
//! level and never surface: the manager keeps working from memory.

use std::sync::Arc;
use std::time::Duration;

use augur_analytics_core::keys::SESSION_KEY;
use augur_analytics_core::{generate_session_id, SessionRecord};
use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use crate::storage::KeyValueStore;

struct SessionState {
	record: SessionRecord,
	user_id: Option<String>,
}

/// Owns the session id and the bound user id.
pub struct SessionManager {
	timeout: Duration,
	store: Option<Arc<dyn KeyValueStore>>,
	state: Mutex<SessionState>,
	current: watch::Sender<String>,
}

impl SessionManager {
	/// Creates a manager with a fresh, not yet persisted session.
	///
	/// Pass `store = None` when persistence is disabled; every call to
	/// [`get_or_create_session`](Self::get_or_create_session) then starts a
	/// new session.
	pub fn new(
		timeout: Duration,
		store: Option<Arc<dyn KeyValueStore>>,
		user_id: Option<String>,
	) -> Self {
		let now = Utc::now();
		let record = SessionRecord::new(generate_session_id(user_id.as_deref(), now), now);
		let (current, _) = watch::channel(record.session_id.clone());
		Self {
			timeout,
			store,
			state: Mutex::new(SessionState { record, user_id }),
			current,
		}
	}

	/// Resumes the persisted session if it is still within the timeout
	/// (refreshing its timestamp), otherwise starts a new one.
	pub async fn get_or_create_session(&self) -> String {
		let now = Utc::now();
		let mut state = self.state.lock().await;

		let record = match self.load().await {
			Some(mut persisted) if !persisted.is_expired(now, self.timeout) => {
				debug!(session_id = %persisted.session_id, "Resuming persisted session");
				persisted.touch(now);
				persisted
			}
			_ => {
				let record =
					SessionRecord::new(generate_session_id(state.user_id.as_deref(), now), now);
				info!(session_id = %record.session_id, "Starting new session");
				record
			}
		};

		self.replace(&mut state, record).await
	}

	/// Makes `session_id` the current session, e.g. one handed over by the
	/// host page.
	pub async fn adopt(&self, session_id: impl Into<String>) -> String {
		let mut state = self.state.lock().await;
		let record = SessionRecord::new(session_id, Utc::now());
		self.replace(&mut state, record).await
	}

	/// Records activity. Starts a new session if the current one has been
	/// idle for the full timeout, then persists the refreshed timestamp.
	pub async fn touch(&self) -> String {
		let now = Utc::now();
		let mut state = self.state.lock().await;

		if state.record.is_expired(now, self.timeout) {
			let record = SessionRecord::new(generate_session_id(state.user_id.as_deref(), now), now);
			info!(
				previous = %state.record.session_id,
				session_id = %record.session_id,
				"Session expired, starting new session"
			);
			return self.replace(&mut state, record).await;
		}

		state.record.touch(now);
		let record = state.record.clone();
		self.persist(&record).await;
		record.session_id
	}

	/// Drops the user binding and starts a new anonymous session.
	pub async fn reset(&self) -> String {
		let now = Utc::now();
		let mut state = self.state.lock().await;
		state.user_id = None;
		let record = SessionRecord::new(generate_session_id(None, now), now);
		info!(session_id = %record.session_id, "Session reset");
		self.replace(&mut state, record).await
	}

	/// Binds `user_id` for the rest of the session.
	pub async fn identify(&self, user_id: impl Into<String>) {
		self.state.lock().await.user_id = Some(user_id.into());
	}

	pub async fn user_id(&self) -> Option<String> {
		self.state.lock().await.user_id.clone()
	}

	/// The current session id, without waiting on the state lock.
	pub fn session_id(&self) -> String {
		self.current.borrow().clone()
	}

	/// Follows the current session id; used by synchronous readers such as
	/// request interceptors.
	pub fn subscribe(&self) -> watch::Receiver<String> {
		self.current.subscribe()
	}

	async fn replace(&self, state: &mut SessionState, record: SessionRecord) -> String {
		self.persist(&record).await;
		state.record = record;
		let session_id = state.record.session_id.clone();
		self.current.send_replace(session_id.clone());
		session_id
	}

	async fn load(&self) -> Option<SessionRecord> {
		let store = self.store.as_ref()?;
		let raw = match store.get(SESSION_KEY).await {
			Ok(raw) => raw?,
			Err(e) => {
				debug!(error = %e, "Failed to read persisted session");
				return None;
			}
		};
		match SessionRecord::from_json(&raw) {
			Ok(record) => Some(record),
			Err(e) => {
				debug!(error = %e, "Ignoring malformed persisted session");
				None
			}
		}
	}

	async fn persist(&self, record: &SessionRecord) {
		let Some(store) = &self.store else {
			return;
		};
		let raw = match record.to_json() {
			Ok(raw) => raw,
			Err(e) => {
				debug!(error = %e, "Failed to encode session");
				return;
			}
		};
		if let Err(e) = store.set(SESSION_KEY, &raw).await {
			debug!(error = %e, "Failed to persist session");
		}
	}
}
