// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP utilities for Augur.
//!
//! This crate provides:
//! - A pre-configured HTTP client with consistent User-Agent header
//! - Instance-scoped request interceptors that decorate outgoing requests
//! - Retry logic with linear or exponential backoff for transient failures

mod client;
mod interceptor;
mod retry;

pub use client::{builder, user_agent};
pub use interceptor::{InterceptedClient, InterceptorId, RequestInterceptor};
pub use retry::{retry, Backoff, RetryConfig, RetryableError};
