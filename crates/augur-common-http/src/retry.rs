// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Retry logic with backoff for HTTP requests.

use std::time::Duration;
use tracing::warn;

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
	/// `base_delay * factor^n` for the n-th retry (zero based).
	Exponential { factor: f64 },
	/// `base_delay * attempt` where `attempt` is the one-based number of the
	/// attempt that just failed.
	Linear,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
	/// Total number of attempts, including the first one.
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub backoff: Backoff,
	pub jitter: bool,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_millis(200),
			max_delay: Duration::from_secs(5),
			backoff: Backoff::Exponential { factor: 2.0 },
			jitter: true,
		}
	}
}

impl RetryConfig {
	/// Linear backoff without jitter: waits `base_delay`, `2 * base_delay`, ...
	/// between attempts.
	pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
		Self {
			max_attempts,
			base_delay,
			max_delay: Duration::MAX,
			backoff: Backoff::Linear,
			jitter: false,
		}
	}
}

pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

/// Delay to wait after the `retry_index`-th failure (zero based).
fn calculate_delay(cfg: &RetryConfig, retry_index: u32) -> Duration {
	let base = cfg.base_delay.as_secs_f64();
	let raw_delay = match cfg.backoff {
		Backoff::Exponential { factor } => base * factor.powi(retry_index as i32),
		Backoff::Linear => base * f64::from(retry_index + 1),
	};
	let capped_delay = raw_delay.min(cfg.max_delay.as_secs_f64());

	let final_delay = if cfg.jitter {
		let jitter_factor = 0.5 + fastrand::f64();
		capped_delay * jitter_factor
	} else {
		capped_delay
	};

	Duration::from_secs_f64(final_delay)
}

pub async fn retry<F, Fut, T, E>(cfg: &RetryConfig, mut f: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: std::future::Future<Output = Result<T, E>>,
	E: RetryableError + std::fmt::Debug,
{
	let mut attempt = 0;

	loop {
		match f().await {
			Ok(result) => return Ok(result),
			Err(err) => {
				attempt += 1;

				if !err.is_retryable() {
					warn!(
							error = ?err,
							attempt = attempt,
							"non-retryable error encountered"
					);
					return Err(err);
				}

				if attempt >= cfg.max_attempts {
					warn!(
							error = ?err,
							attempt = attempt,
							max_attempts = cfg.max_attempts,
							"max retry attempts exhausted"
					);
					return Err(err);
				}

				let delay = calculate_delay(cfg, attempt - 1);
				warn!(
						error = ?err,
						attempt = attempt,
						max_attempts = cfg.max_attempts,
						delay_ms = delay.as_millis(),
						"retrying after error"
				);

				tokio::time::sleep(delay).await;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::Arc;

	#[derive(Debug)]
	struct MockError {
		retryable: bool,
	}

	impl RetryableError for MockError {
		fn is_retryable(&self) -> bool {
			self.retryable
		}
	}

	#[tokio::test]
	async fn test_non_retryable_error_fails_immediately() {
		let attempt_count = Arc::new(AtomicU32::new(0));
		let attempt_count_clone = Arc::clone(&attempt_count);

		let cfg = RetryConfig::default();

		let result: Result<(), MockError> = retry(&cfg, || {
			let count = Arc::clone(&attempt_count_clone);
			async move {
				count.fetch_add(1, Ordering::SeqCst);
				Err(MockError { retryable: false })
			}
		})
		.await;

		assert!(result.is_err());
		assert_eq!(
			attempt_count.load(Ordering::SeqCst),
			1,
			"non-retryable error should only attempt once"
		);
	}

	#[tokio::test]
	async fn test_retryable_error_retries_up_to_max_attempts() {
		let attempt_count = Arc::new(AtomicU32::new(0));
		let attempt_count_clone = Arc::clone(&attempt_count);

		let cfg = RetryConfig {
			max_attempts: 3,
			base_delay: Duration::from_millis(1),
			max_delay: Duration::from_millis(10),
			backoff: Backoff::Exponential { factor: 2.0 },
			jitter: false,
		};

		let result: Result<(), MockError> = retry(&cfg, || {
			let count = Arc::clone(&attempt_count_clone);
			async move {
				count.fetch_add(1, Ordering::SeqCst);
				Err(MockError { retryable: true })
			}
		})
		.await;

		assert!(result.is_err());
		assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn test_succeeds_after_retries() {
		let attempt_count = Arc::new(AtomicU32::new(0));
		let attempt_count_clone = Arc::clone(&attempt_count);

		let cfg = RetryConfig::linear(5, Duration::from_millis(1));

		let result: Result<&str, MockError> = retry(&cfg, || {
			let count = Arc::clone(&attempt_count_clone);
			async move {
				let current = count.fetch_add(1, Ordering::SeqCst);
				if current < 2 {
					Err(MockError { retryable: true })
				} else {
					Ok("success")
				}
			}
		})
		.await;

		assert_eq!(result.unwrap(), "success");
		assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
	}

	#[test]
	fn test_linear_backoff_scales_with_attempt_number() {
		let cfg = RetryConfig::linear(4, Duration::from_secs(1));

		assert_eq!(calculate_delay(&cfg, 0), Duration::from_secs(1));
		assert_eq!(calculate_delay(&cfg, 1), Duration::from_secs(2));
		assert_eq!(calculate_delay(&cfg, 2), Duration::from_secs(3));
	}

	#[tokio::test(start_paused = true)]
	async fn test_linear_retry_waits_between_attempts() {
		let cfg = RetryConfig::linear(4, Duration::from_secs(1));
		let started = tokio::time::Instant::now();

		let result: Result<(), MockError> =
			retry(&cfg, || async { Err(MockError { retryable: true }) }).await;

		assert!(result.is_err());
		// 1s + 2s + 3s between four attempts
		assert_eq!(started.elapsed(), Duration::from_secs(6));
	}

	#[test]
	fn test_jitter_adds_randomness() {
		let cfg_with_jitter = RetryConfig {
			max_attempts: 3,
			base_delay: Duration::from_millis(100),
			max_delay: Duration::from_secs(5),
			backoff: Backoff::Exponential { factor: 2.0 },
			jitter: true,
		};

		let cfg_without_jitter = RetryConfig {
			jitter: false,
			..cfg_with_jitter.clone()
		};

		let delays_without_jitter: Vec<Duration> = (0..10)
			.map(|_| calculate_delay(&cfg_without_jitter, 1))
			.collect();

		let delays_with_jitter: Vec<Duration> = (0..10)
			.map(|_| calculate_delay(&cfg_with_jitter, 1))
			.collect();

		assert!(delays_without_jitter.windows(2).all(|w| w[0] == w[1]));
		assert!(!delays_with_jitter.windows(2).all(|w| w[0] == w[1]));
	}

	#[test]
	fn test_delay_respects_max_delay() {
		let cfg = RetryConfig {
			max_attempts: 10,
			base_delay: Duration::from_secs(1),
			max_delay: Duration::from_secs(5),
			backoff: Backoff::Exponential { factor: 10.0 },
			jitter: false,
		};

		for attempt in 0..10 {
			let delay = calculate_delay(&cfg, attempt);
			assert!(
				delay <= Duration::from_secs(5),
				"delay {delay:?} at attempt {attempt} exceeds max_delay"
			);
		}
	}
}
