// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event queue and batch scheduling.
//!
//! Events are flushed when the queue reaches `batch_size`, when
//! `batch_timeout` has passed since the first unflushed event, or on an
//! explicit [`BatchScheduler::flush`]. Only one batch is ever in flight;
//! events enqueued meanwhile wait for the next flush, so batches reach the
//! sender in enqueue order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use augur_analytics_core::EventPayload;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{AnalyticsError, Result};

/// Configuration for the event batch queue.
#[derive(Debug, Clone)]
pub struct BatchConfig {
	/// Queue length that triggers an immediate flush, and the largest batch
	/// handed to the sender.
	pub batch_size: usize,
	/// Delay between the first unflushed enqueue and the automatic flush.
	pub batch_timeout: Duration,
}

impl Default for BatchConfig {
	fn default() -> Self {
		Self {
			batch_size: 10,
			batch_timeout: Duration::from_secs(5),
		}
	}
}

/// Handler for sending batched events to the server.
#[async_trait::async_trait]
pub trait BatchSender: Send + Sync {
	/// Delivers one batch. An error means the events were lost.
	async fn send_batch(&self, events: Vec<EventPayload>) -> Result<()>;
}

/// What a call to [`BatchScheduler::flush`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
	/// Nothing was queued.
	Empty,
	/// A previous batch is still being delivered; the queue is untouched.
	InFlight,
	/// A batch of `count` events was handed to the sender.
	Started { count: usize },
}

/// Owns the pending events and decides when they are delivered.
pub struct BatchScheduler {
	config: BatchConfig,
	sender: Arc<dyn BatchSender>,
	queue: Mutex<Vec<EventPayload>>,
	deadline: Mutex<Option<Instant>>,
	in_flight: Mutex<Option<JoinHandle<()>>>,
	shutdown: AtomicBool,
	wake: Notify,
}

impl BatchScheduler {
	pub fn new(config: BatchConfig, sender: Arc<dyn BatchSender>) -> Self {
		Self {
			config: BatchConfig {
				batch_size: config.batch_size.max(1),
				..config
			},
			sender,
			queue: Mutex::new(Vec::new()),
			deadline: Mutex::new(None),
			in_flight: Mutex::new(None),
			shutdown: AtomicBool::new(false),
			wake: Notify::new(),
		}
	}

	/// Appends an event to the tail of the queue.
	///
	/// Reaching `batch_size` flushes right away; otherwise the batch timer is
	/// started if it is not already running.
	pub async fn enqueue(self: &Arc<Self>, event: EventPayload) -> Result<()> {
		if self.shutdown.load(Ordering::SeqCst) {
			return Err(AnalyticsError::ClientShutdown);
		}

		let pending = {
			let mut queue = self.queue.lock().await;
			queue.push(event);
			queue.len()
		};

		if pending >= self.config.batch_size {
			self.flush().await;
		} else {
			self.arm_deadline().await;
		}

		Ok(())
	}

	/// Hands the head of the queue (at most `batch_size` events) to the
	/// sender on a background task.
	///
	/// Does nothing while an earlier batch is still in flight; whatever is
	/// left in the queue is picked up once that delivery completes.
	pub async fn flush(self: &Arc<Self>) -> FlushOutcome {
		let mut in_flight = self.in_flight.lock().await;
		if in_flight.as_ref().is_some_and(|handle| !handle.is_finished()) {
			debug!("Flush skipped, batch already in flight");
			return FlushOutcome::InFlight;
		}

		let batch: Vec<EventPayload> = {
			let mut queue = self.queue.lock().await;
			let take = queue.len().min(self.config.batch_size);
			queue.drain(..take).collect()
		};
		*self.deadline.lock().await = None;

		if batch.is_empty() {
			return FlushOutcome::Empty;
		}

		let count = batch.len();
		debug!(count, "Flushing event batch");

		let this = Arc::clone(self);
		*in_flight = Some(tokio::spawn(async move {
			if let Err(e) = this.sender.send_batch(batch).await {
				warn!(error = %e, count, "Analytics batch dropped");
			}
			// let the run loop look at whatever queued up meanwhile
			this.wake.notify_one();
		}));

		FlushOutcome::Started { count }
	}

	/// Waits for the in-flight delivery, if any, to finish.
	pub async fn wait_idle(&self) {
		let mut in_flight = self.in_flight.lock().await;
		if let Some(handle) = in_flight.as_mut() {
			if let Err(e) = handle.await {
				warn!(error = %e, "Analytics delivery task failed");
			}
		}
		*in_flight = None;
	}

	pub async fn queue_len(&self) -> usize {
		self.queue.lock().await.len()
	}

	/// Delivers every queued event, one batch at a time, and returns once
	/// the last batch has been handed off and completed. Returns the number
	/// of events flushed.
	pub async fn flush_all(self: &Arc<Self>) -> usize {
		let mut flushed = 0;
		loop {
			self.wait_idle().await;
			match self.flush().await {
				FlushOutcome::Empty => break,
				FlushOutcome::Started { count } => flushed += count,
				FlushOutcome::InFlight => {}
			}
		}
		flushed
	}

	/// Rejects further events, delivers everything still queued and stops
	/// the run loop.
	pub async fn shutdown(self: &Arc<Self>) {
		self.shutdown.store(true, Ordering::SeqCst);
		self.flush_all().await;
		self.wake.notify_one();
	}

	/// Runs the batch timer until [`shutdown`](Self::shutdown) is called.
	pub async fn run(self: Arc<Self>) {
		info!(
			batch_size = self.config.batch_size,
			batch_timeout_ms = self.config.batch_timeout.as_millis() as u64,
			"Starting analytics batch scheduler"
		);

		loop {
			if self.shutdown.load(Ordering::SeqCst) {
				break;
			}

			let deadline = *self.deadline.lock().await;

			tokio::select! {
				_ = sleep_until(deadline) => {
					*self.deadline.lock().await = None;
					if self.flush().await == FlushOutcome::InFlight {
						debug!("Batch timer fired during delivery, waiting for it to finish");
					}
				}
				_ = self.wake.notified() => {
					self.on_wake().await;
				}
			}
		}

		info!("Analytics batch scheduler stopped");
	}

	async fn on_wake(self: &Arc<Self>) {
		if self.shutdown.load(Ordering::SeqCst) {
			return;
		}

		let pending = self.queue.lock().await.len();
		if pending >= self.config.batch_size {
			self.flush().await;
		} else if pending > 0 {
			self.arm_deadline().await;
		}
	}

	async fn arm_deadline(&self) {
		let mut deadline = self.deadline.lock().await;
		if deadline.is_none() {
			*deadline = Some(Instant::now() + self.config.batch_timeout);
			self.wake.notify_one();
		}
	}
}

async fn sleep_until(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => tokio::time::sleep_until(deadline).await,
		None => std::future::pending().await,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	struct MockSender {
		batches: Mutex<Vec<Vec<EventPayload>>>,
		hold: AtomicBool,
		release: Notify,
		should_fail: AtomicBool,
	}

	impl MockSender {
		fn new() -> Self {
			Self {
				batches: Mutex::new(Vec::new()),
				hold: AtomicBool::new(false),
				release: Notify::new(),
				should_fail: AtomicBool::new(false),
			}
		}

		async fn batch_names(&self) -> Vec<Vec<String>> {
			self
				.batches
				.lock()
				.await
				.iter()
				.map(|batch| batch.iter().map(|e| e.event_type.clone()).collect())
				.collect()
		}

		fn hold(&self) {
			self.hold.store(true, Ordering::SeqCst);
		}

		fn release(&self) {
			self.hold.store(false, Ordering::SeqCst);
			self.release.notify_one();
		}
	}

	#[async_trait::async_trait]
	impl BatchSender for MockSender {
		async fn send_batch(&self, events: Vec<EventPayload>) -> Result<()> {
			if self.hold.load(Ordering::SeqCst) {
				self.release.notified().await;
			}
			if self.should_fail.load(Ordering::SeqCst) {
				return Err(AnalyticsError::ServerError {
					status: 500,
					message: "mock failure".to_string(),
				});
			}
			self.batches.lock().await.push(events);
			Ok(())
		}
	}

	fn event(name: &str) -> EventPayload {
		EventPayload::new("wk_test", "sess-test", name)
	}

	fn scheduler(batch_size: usize, timeout_ms: u64) -> (Arc<BatchScheduler>, Arc<MockSender>) {
		let sender = Arc::new(MockSender::new());
		let config = BatchConfig {
			batch_size,
			batch_timeout: Duration::from_millis(timeout_ms),
		};
		(Arc::new(BatchScheduler::new(config, sender.clone())), sender)
	}

	#[tokio::test]
	async fn test_enqueue_below_threshold_waits() {
		let (scheduler, sender) = scheduler(10, 60_000);

		scheduler.enqueue(event("e1")).await.unwrap();

		assert_eq!(scheduler.queue_len().await, 1);
		scheduler.wait_idle().await;
		assert!(sender.batch_names().await.is_empty());
	}

	#[tokio::test]
	async fn test_reaching_batch_size_flushes_immediately() {
		let (scheduler, sender) = scheduler(2, 60_000);

		scheduler.enqueue(event("e1")).await.unwrap();
		scheduler.enqueue(event("e2")).await.unwrap();
		scheduler.wait_idle().await;

		assert_eq!(sender.batch_names().await, vec![vec!["e1", "e2"]]);
		assert_eq!(scheduler.queue_len().await, 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_timer_flushes_after_batch_timeout() {
		let (scheduler, sender) = scheduler(10, 1000);
		let run = tokio::spawn(Arc::clone(&scheduler).run());

		scheduler.enqueue(event("e1")).await.unwrap();

		tokio::time::sleep(Duration::from_millis(999)).await;
		assert!(sender.batch_names().await.is_empty());

		tokio::time::sleep(Duration::from_millis(2)).await;
		scheduler.wait_idle().await;
		assert_eq!(sender.batch_names().await, vec![vec!["e1"]]);

		scheduler.shutdown().await;
		run.await.unwrap();
	}

	#[tokio::test(start_paused = true)]
	async fn test_timer_restarts_after_flush() {
		let (scheduler, sender) = scheduler(10, 1000);
		let run = tokio::spawn(Arc::clone(&scheduler).run());

		scheduler.enqueue(event("e1")).await.unwrap();
		tokio::time::sleep(Duration::from_millis(600)).await;
		assert_eq!(
			scheduler.flush().await,
			FlushOutcome::Started { count: 1 }
		);
		scheduler.wait_idle().await;

		scheduler.enqueue(event("e2")).await.unwrap();
		// the old deadline (t=1000) must not fire for the new event
		tokio::time::sleep(Duration::from_millis(500)).await;
		assert_eq!(sender.batch_names().await.len(), 1);

		tokio::time::sleep(Duration::from_millis(501)).await;
		scheduler.wait_idle().await;
		assert_eq!(sender.batch_names().await, vec![vec!["e1"], vec!["e2"]]);

		scheduler.shutdown().await;
		run.await.unwrap();
	}

	#[tokio::test]
	async fn test_flush_empty_queue_is_noop() {
		let (scheduler, sender) = scheduler(10, 60_000);

		assert_eq!(scheduler.flush().await, FlushOutcome::Empty);
		scheduler.wait_idle().await;
		assert!(sender.batch_names().await.is_empty());
	}

	#[tokio::test]
	async fn test_flush_is_single_flight() {
		let (scheduler, sender) = scheduler(10, 60_000);
		sender.hold();

		scheduler.enqueue(event("e1")).await.unwrap();
		assert_eq!(
			scheduler.flush().await,
			FlushOutcome::Started { count: 1 }
		);

		scheduler.enqueue(event("e2")).await.unwrap();
		assert_eq!(scheduler.flush().await, FlushOutcome::InFlight);
		assert_eq!(scheduler.flush().await, FlushOutcome::InFlight);
		assert_eq!(scheduler.queue_len().await, 1);

		sender.release();
		scheduler.wait_idle().await;
		assert_eq!(
			scheduler.flush().await,
			FlushOutcome::Started { count: 1 }
		);
		scheduler.wait_idle().await;

		assert_eq!(sender.batch_names().await, vec![vec!["e1"], vec!["e2"]]);
	}

	#[tokio::test]
	async fn test_flush_all_waits_for_in_flight_and_empties_queue() {
		let (scheduler, sender) = scheduler(2, 60_000);
		sender.hold();

		for name in ["e1", "e2", "e3", "e4", "e5"] {
			scheduler.enqueue(event(name)).await.unwrap();
		}
		assert_eq!(scheduler.queue_len().await, 3);

		let flushing = {
			let scheduler = Arc::clone(&scheduler);
			tokio::spawn(async move { scheduler.flush_all().await })
		};
		sender.release();

		assert_eq!(flushing.await.unwrap(), 3);
		assert_eq!(scheduler.queue_len().await, 0);
		assert_eq!(
			sender.batch_names().await,
			vec![vec!["e1", "e2"], vec!["e3", "e4"], vec!["e5"]]
		);
	}

	#[tokio::test(start_paused = true)]
	async fn test_backlog_is_delivered_after_in_flight_batch() {
		let (scheduler, sender) = scheduler(2, 1000);
		let run = tokio::spawn(Arc::clone(&scheduler).run());
		sender.hold();

		for name in ["e1", "e2", "e3", "e4", "e5"] {
			scheduler.enqueue(event(name)).await.unwrap();
		}
		assert_eq!(scheduler.queue_len().await, 3);

		sender.release();
		tokio::time::sleep(Duration::from_millis(1500)).await;
		scheduler.wait_idle().await;

		assert_eq!(
			sender.batch_names().await,
			vec![vec!["e1", "e2"], vec!["e3", "e4"], vec!["e5"]]
		);

		scheduler.shutdown().await;
		run.await.unwrap();
	}

	#[tokio::test]
	async fn test_failed_send_does_not_stop_scheduler() {
		let (scheduler, sender) = scheduler(1, 60_000);
		sender.should_fail.store(true, Ordering::SeqCst);

		scheduler.enqueue(event("e1")).await.unwrap();
		scheduler.wait_idle().await;

		sender.should_fail.store(false, Ordering::SeqCst);
		scheduler.enqueue(event("e2")).await.unwrap();
		scheduler.wait_idle().await;

		assert_eq!(sender.batch_names().await, vec![vec!["e2"]]);
	}

	#[tokio::test]
	async fn test_shutdown_delivers_queue_and_rejects_enqueue() {
		let (scheduler, sender) = scheduler(2, 60_000);
		let run = tokio::spawn(Arc::clone(&scheduler).run());

		for name in ["e1", "e2", "e3"] {
			scheduler.enqueue(event(name)).await.unwrap();
		}
		scheduler.shutdown().await;
		run.await.unwrap();

		assert_eq!(
			sender.batch_names().await,
			vec![vec!["e1", "e2"], vec!["e3"]]
		);
		assert!(matches!(
			scheduler.enqueue(event("late")).await,
			Err(AnalyticsError::ClientShutdown)
		));
	}

	proptest! {
		#[test]
		fn batches_are_ordered_slices_no_larger_than_batch_size(
			batch_size in 1..8usize,
			count in 0..40usize,
		) {
			let runtime = tokio::runtime::Builder::new_current_thread()
				.enable_time()
				.build()
				.unwrap();

			let batches = runtime.block_on(async {
				let (scheduler, sender) = scheduler(batch_size, 60_000);
				for i in 0..count {
					scheduler.enqueue(event(&format!("e{i}"))).await.unwrap();
				}
				scheduler.shutdown().await;
				sender.batch_names().await
			});

			prop_assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= batch_size));
			let delivered: Vec<String> = batches.into_iter().flatten().collect();
			let expected: Vec<String> = (0..count).map(|i| format!("e{i}")).collect();
			prop_assert_eq!(delivered, expected);
		}
	}
}
