// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the analytics client.

use augur_analytics_core::CoreError;
use augur_common_http::RetryableError;
use thiserror::Error;

use crate::storage::StorageError;

/// Analytics client errors.
///
/// Tracking calls only ever surface [`AnalyticsError::ClientShutdown`]; the
/// delivery variants are consumed by the retry and persistence path.
#[derive(Debug, Error)]
pub enum AnalyticsError {
	/// Write key is missing.
	#[error("write key is required")]
	InvalidWriteKey,

	/// Endpoint is missing.
	#[error("endpoint is required")]
	InvalidEndpoint,

	/// HTTP request failed.
	#[error("HTTP request failed: {0}")]
	RequestFailed(#[from] reqwest::Error),

	/// Ingestion endpoint answered with a non-success status.
	#[error("server error ({status}): {message}")]
	ServerError { status: u16, message: String },

	/// Client has been shut down.
	#[error("client has been shut down")]
	ClientShutdown,

	/// Durable storage failed.
	#[error("storage error: {0}")]
	Storage(#[from] StorageError),

	/// Serialization error.
	#[error("serialization error: {0}")]
	SerializationError(String),
}

impl From<CoreError> for AnalyticsError {
	fn from(err: CoreError) -> Self {
		AnalyticsError::SerializationError(err.to_string())
	}
}

impl From<serde_json::Error> for AnalyticsError {
	fn from(err: serde_json::Error) -> Self {
		AnalyticsError::SerializationError(err.to_string())
	}
}

impl RetryableError for AnalyticsError {
	/// Every transport failure is retried, whatever the status code.
	fn is_retryable(&self) -> bool {
		matches!(
			self,
			AnalyticsError::RequestFailed(_) | AnalyticsError::ServerError { .. }
		)
	}
}

/// Result type alias for analytics operations.
pub type Result<T> = std::result::Result<T, AnalyticsError>;
