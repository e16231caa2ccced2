// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for decoding persisted analytics data.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
	#[error("malformed session record: {0}")]
	MalformedSession(String),

	#[error("malformed event record: {0}")]
	MalformedEvents(String),

	#[error("serialization error: {0}")]
	Serialization(String),
}

impl From<serde_json::Error> for CoreError {
	fn from(err: serde_json::Error) -> Self {
		CoreError::Serialization(err.to_string())
	}
}

pub type Result<T> = std::result::Result<T, CoreError>;
