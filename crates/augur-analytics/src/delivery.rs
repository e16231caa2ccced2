// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The [`BatchSender`] behind every client: transport first, offline record
//! second.

use std::sync::Arc;

use augur_analytics_core::EventPayload;
use tracing::{debug, warn};

use crate::batch::BatchSender;
use crate::error::Result;
use crate::persistence::OfflineStore;
use crate::session::SessionManager;
use crate::transport::Transport;

pub struct DeliveryPipeline {
	transport: Arc<Transport>,
	offline: Option<OfflineStore>,
	session: Arc<SessionManager>,
}

impl DeliveryPipeline {
	pub fn new(
		transport: Arc<Transport>,
		offline: Option<OfflineStore>,
		session: Arc<SessionManager>,
	) -> Self {
		Self {
			transport,
			offline,
			session,
		}
	}
}

#[async_trait::async_trait]
impl BatchSender for DeliveryPipeline {
	/// Only fails when the batch could neither be delivered nor persisted.
	async fn send_batch(&self, events: Vec<EventPayload>) -> Result<()> {
		let err = match self.transport.send(&events).await {
			Ok(()) => return Ok(()),
			Err(e) => e,
		};

		let session_id = self.session.session_id();
		warn!(
			error = %err,
			count = events.len(),
			session_id = %session_id,
			"Analytics delivery failed after retries"
		);

		let Some(offline) = &self.offline else {
			return Err(err);
		};

		match offline.persist(&session_id, &events).await {
			Ok(()) => Ok(()),
			Err(persist_err) => {
				debug!(error = %persist_err, "Failed to persist undelivered events");
				Err(err)
			}
		}
	}
}
