// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Request interceptors scoped to a single client instance.
//!
//! An [`InterceptedClient`] wraps a `reqwest::Client` and runs every
//! registered [`RequestInterceptor`] over each request it builds. Interceptors
//! are owned by the client value (and its clones), so two independently
//! configured clients never see each other's decorations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use reqwest::{Client, Method, RequestBuilder};
use tracing::debug;

/// Decorates an outgoing request before it is sent.
pub trait RequestInterceptor: Send + Sync {
	fn intercept(&self, request: RequestBuilder) -> RequestBuilder;
}

impl<F> RequestInterceptor for F
where
	F: Fn(RequestBuilder) -> RequestBuilder + Send + Sync,
{
	fn intercept(&self, request: RequestBuilder) -> RequestBuilder {
		self(request)
	}
}

/// Handle returned by [`InterceptedClient::register`], used to remove the
/// interceptor again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterceptorId(u64);

type Registry = Vec<(InterceptorId, Arc<dyn RequestInterceptor>)>;

/// HTTP client that applies its registered interceptors to every request.
///
/// Clones share the same interceptor registry.
#[derive(Clone)]
pub struct InterceptedClient {
	inner: Client,
	interceptors: Arc<RwLock<Registry>>,
	next_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for InterceptedClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("InterceptedClient")
			.field("interceptors", &self.interceptor_count())
			.finish_non_exhaustive()
	}
}

impl InterceptedClient {
	pub fn new(inner: Client) -> Self {
		Self {
			inner,
			interceptors: Arc::new(RwLock::new(Vec::new())),
			next_id: Arc::new(AtomicU64::new(1)),
		}
	}

	/// Registers an interceptor. Interceptors run in registration order.
	pub fn register(&self, interceptor: impl RequestInterceptor + 'static) -> InterceptorId {
		let id = InterceptorId(self.next_id.fetch_add(1, Ordering::Relaxed));
		self
			.interceptors
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.push((id, Arc::new(interceptor)));
		debug!(interceptor_id = id.0, "Registered request interceptor");
		id
	}

	/// Removes a previously registered interceptor. Returns false if it was
	/// already gone.
	pub fn remove(&self, id: InterceptorId) -> bool {
		let mut registry = self
			.interceptors
			.write()
			.unwrap_or_else(PoisonError::into_inner);
		let before = registry.len();
		registry.retain(|(existing, _)| *existing != id);
		let removed = registry.len() != before;
		if removed {
			debug!(interceptor_id = id.0, "Removed request interceptor");
		}
		removed
	}

	pub fn interceptor_count(&self) -> usize {
		self
			.interceptors
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.len()
	}

	/// Builds a request with every interceptor applied.
	pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
		let registry = self
			.interceptors
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.clone();
		registry
			.iter()
			.fold(self.inner.request(method, url), |request, (_, interceptor)| {
				interceptor.intercept(request)
			})
	}

	pub fn get(&self, url: &str) -> RequestBuilder {
		self.request(Method::GET, url)
	}

	pub fn post(&self, url: &str) -> RequestBuilder {
		self.request(Method::POST, url)
	}

	/// The undecorated client, for requests that must not carry custom
	/// headers.
	pub fn inner(&self) -> &Client {
		&self.inner
	}
}
