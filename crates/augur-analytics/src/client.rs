// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The public tracking client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use augur_analytics_core::{
	DeviceInfo, DeviceInfoProvider, EnvironmentSnapshot, EventPayload, ScreenInfo,
	UserAgentDeviceProvider, EVENTS_PATH,
};
use augur_common_http::{InterceptedClient, InterceptorId};
use chrono::{SecondsFormat, Utc};
use reqwest::RequestBuilder;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::batch::{BatchScheduler, FlushOutcome};
use crate::config::ClientConfig;
use crate::delivery::DeliveryPipeline;
use crate::error::{AnalyticsError, Result};
use crate::host::{PageContext, Visibility};
use crate::persistence::{DrainReport, OfflineStore};
use crate::properties::Properties;
use crate::session::SessionManager;
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::transport::{BeaconChannel, HttpChannel, Transport};

/// Header carrying the current session id on every request made through the
/// client's [`InterceptedClient`].
pub const SESSION_HEADER: &str = "X-Augur-Session-ID";

/// Per-call overrides for [`AnalyticsClient::track_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackOptions {
	/// Overrides the instance-level feed id for this event.
	pub feed_id: Option<String>,
	/// Display name; defaults to the event type.
	pub event_name: Option<String>,
	pub event_description: Option<String>,
}

impl TrackOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn feed_id(mut self, feed_id: impl Into<String>) -> Self {
		self.feed_id = Some(feed_id.into());
		self
	}

	pub fn event_name(mut self, name: impl Into<String>) -> Self {
		self.event_name = Some(name.into());
		self
	}

	pub fn event_description(mut self, description: impl Into<String>) -> Self {
		self.event_description = Some(description.into());
		self
	}
}

/// Builder for constructing an [`AnalyticsClient`].
pub struct AnalyticsClientBuilder {
	config: ClientConfig,
	storage: Option<Arc<dyn KeyValueStore>>,
	beacon: Option<Arc<dyn BeaconChannel>>,
	device_info: Option<Arc<dyn DeviceInfoProvider>>,
	page: Option<Arc<dyn PageContext>>,
}

impl AnalyticsClientBuilder {
	pub fn new() -> Self {
		Self {
			config: ClientConfig::default(),
			storage: None,
			beacon: None,
			device_info: None,
			page: None,
		}
	}

	/// Replaces every setting at once, e.g. with a deserialized init object.
	pub fn config(mut self, config: ClientConfig) -> Self {
		self.config = config;
		self
	}

	pub fn write_key(mut self, key: impl Into<String>) -> Self {
		self.config.write_key = key.into();
		self
	}

	/// Base URL of the ingestion service, e.g. `https://ingest.example.com`.
	pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.config.endpoint = endpoint.into();
		self
	}

	pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
		self.config.user_id = Some(user_id.into());
		self
	}

	/// Uses this session id instead of resuming or generating one.
	pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
		self.config.session_id = Some(session_id.into());
		self
	}

	pub fn feed_id(mut self, feed_id: impl Into<String>) -> Self {
		self.config.feed_id = Some(feed_id.into());
		self
	}

	pub fn batch_size(mut self, size: usize) -> Self {
		self.config.batch_size = size;
		self
	}

	pub fn batch_timeout(mut self, timeout: Duration) -> Self {
		self.config.batch_timeout = timeout;
		self
	}

	pub fn session_timeout(mut self, timeout: Duration) -> Self {
		self.config.session_timeout = timeout;
		self
	}

	pub fn max_retries(mut self, retries: u32) -> Self {
		self.config.max_retries = retries;
		self
	}

	pub fn retry_base_delay(mut self, delay: Duration) -> Self {
		self.config.retry_base_delay = delay;
		self
	}

	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.config.request_timeout = timeout;
		self
	}

	/// When disabled, sessions do not survive restarts and undeliverable
	/// batches are dropped.
	pub fn enable_persistence(mut self, enabled: bool) -> Self {
		self.config.enable_persistence = enabled;
		self
	}

	/// Logs every tracked event at debug level.
	pub fn debug(mut self, enabled: bool) -> Self {
		self.config.debug = enabled;
		self
	}

	/// Storage for the session and failed-delivery records. Defaults to a
	/// [`FileStore`] in the platform data directory.
	pub fn storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
		self.storage = Some(storage);
		self
	}

	/// Unload-safe channel tried before HTTP on every attempt.
	pub fn beacon(mut self, beacon: Arc<dyn BeaconChannel>) -> Self {
		self.beacon = Some(beacon);
		self
	}

	pub fn device_info(mut self, provider: Arc<dyn DeviceInfoProvider>) -> Self {
		self.device_info = Some(provider);
		self
	}

	/// Location used to default `path`, `url` and `title` on page views.
	pub fn page_context(mut self, page: Arc<dyn PageContext>) -> Self {
		self.page = Some(page);
		self
	}

	/// Builds the client, resolves the session and starts the background
	/// scheduler and the drain of previously persisted events.
	///
	/// Must be called inside a tokio runtime.
	pub async fn build(self) -> Result<AnalyticsClient> {
		let config = self.config;
		if config.write_key.trim().is_empty() {
			return Err(AnalyticsError::InvalidWriteKey);
		}
		if config.endpoint.trim().is_empty() {
			return Err(AnalyticsError::InvalidEndpoint);
		}
		let endpoint = config.endpoint.trim_end_matches('/').to_string();

		let http_client = augur_common_http::builder()
			.timeout(config.request_timeout)
			.build()
			.map_err(AnalyticsError::RequestFailed)?;
		let http = InterceptedClient::new(http_client);

		let store = config
			.enable_persistence
			.then(|| self.storage.unwrap_or_else(default_storage));

		let session = Arc::new(SessionManager::new(
			config.session_timeout,
			store.clone(),
			config.user_id.clone(),
		));
		let session_id = match config.session_id.as_deref().filter(|id| !id.is_empty()) {
			Some(id) => session.adopt(id).await,
			None => session.get_or_create_session().await,
		};

		let current_session = session.subscribe();
		let interceptor = http.register(move |request: RequestBuilder| {
			let session_id = current_session.borrow().clone();
			request.header(SESSION_HEADER, session_id)
		});

		let transport = Arc::new(Transport::new(
			HttpChannel::new(http.clone(), format!("{endpoint}{EVENTS_PATH}")),
			self.beacon,
			config.retry_config(),
		));
		let offline = store.map(OfflineStore::new);

		let pipeline = DeliveryPipeline::new(transport.clone(), offline.clone(), session.clone());
		let scheduler = Arc::new(BatchScheduler::new(config.batch_config(), Arc::new(pipeline)));
		let run_handle = tokio::spawn(Arc::clone(&scheduler).run());

		let drain_handle = offline.map(|offline| {
			tokio::spawn(async move {
				match offline.drain(&transport).await {
					Ok(report) => Some(report),
					Err(e) => {
						debug!(error = %e, "Could not drain persisted analytics events");
						None
					}
				}
			})
		});

		let device_info = self
			.device_info
			.unwrap_or_else(|| Arc::new(UserAgentDeviceProvider::new(host_environment())));

		info!(
			endpoint = %endpoint,
			session_id = %session_id,
			persistence = config.enable_persistence,
			"Analytics client initialized"
		);

		let feed_id = config.feed_id.clone();
		Ok(AnalyticsClient {
			inner: Arc::new(ClientInner {
				config,
				http,
				interceptor,
				session,
				scheduler,
				device_info,
				page: self.page,
				feed_id: RwLock::new(feed_id),
				run_handle: Mutex::new(Some(run_handle)),
				drain_handle: Mutex::new(drain_handle),
				closed: AtomicBool::new(false),
			}),
		})
	}
}

impl Default for AnalyticsClientBuilder {
	fn default() -> Self {
		Self::new()
	}
}

fn default_storage() -> Arc<dyn KeyValueStore> {
	match FileStore::default_path() {
		Some(path) => FileStore::shared(path),
		None => {
			debug!("No local data directory, analytics storage is in-memory");
			Arc::new(MemoryStore::new())
		}
	}
}

/// Environment of a native host, for the default device snapshot.
fn host_environment() -> EnvironmentSnapshot {
	let language = std::env::var("LANG")
		.ok()
		.and_then(|lang| lang.split('.').next().map(|l| l.replace('_', "-")))
		.filter(|lang| !lang.is_empty() && lang != "C" && lang != "POSIX")
		.unwrap_or_else(|| "en-US".to_string());

	EnvironmentSnapshot {
		user_agent: augur_common_http::user_agent(),
		screen: ScreenInfo::default(),
		timezone: std::env::var("TZ").unwrap_or_else(|_| "UTC".to_string()),
		language,
		country: None,
	}
}

struct ClientInner {
	config: ClientConfig,
	http: InterceptedClient,
	interceptor: InterceptorId,
	session: Arc<SessionManager>,
	scheduler: Arc<BatchScheduler>,
	device_info: Arc<dyn DeviceInfoProvider>,
	page: Option<Arc<dyn PageContext>>,
	feed_id: RwLock<Option<String>>,
	run_handle: Mutex<Option<JoinHandle<()>>>,
	drain_handle: Mutex<Option<JoinHandle<Option<DrainReport>>>>,
	closed: AtomicBool,
}

impl Drop for ClientInner {
	fn drop(&mut self) {
		if self.closed.load(Ordering::SeqCst) {
			return;
		}

		if let Some(handle) = self.run_handle.get_mut().take() {
			handle.abort();
		}
		self.http.remove(self.interceptor);
		warn!("Analytics client dropped without shutdown, queued events were discarded");
	}
}

/// Event tracking client.
///
/// Tracking calls return once the event is queued; delivery, retries and
/// offline persistence happen in the background. Clones share the same
/// session and queue.
///
/// Call [`shutdown`](Self::shutdown) before dropping the last clone. Dropping
/// it without one stops the batch timer and discards whatever is queued.
///
/// # Example
///
/// ```ignore
/// use augur_analytics::{AnalyticsClient, Properties};
///
/// let client = AnalyticsClient::builder()
///     .write_key("wk_live_xxx")
///     .endpoint("https://ingest.example.com")
///     .build()
///     .await?;
///
/// client.identify("alice@example.com", Properties::new().insert("plan", "pro")).await?;
/// client.track("button_click", Properties::new().insert("button", "signup")).await?;
///
/// client.shutdown().await?;
/// ```
#[derive(Clone)]
pub struct AnalyticsClient {
	inner: Arc<ClientInner>,
}

impl AnalyticsClient {
	pub fn builder() -> AnalyticsClientBuilder {
		AnalyticsClientBuilder::new()
	}

	/// Tracks `event`, which becomes both its type and its name.
	pub async fn track(&self, event: &str, properties: Properties) -> Result<()> {
		self.track_with(event, properties, TrackOptions::default()).await
	}

	/// Tracks `event` with per-call overrides.
	pub async fn track_with(
		&self,
		event: &str,
		properties: Properties,
		options: TrackOptions,
	) -> Result<()> {
		self.check_closed()?;

		let session_id = self.inner.session.touch().await;
		let user_id = self.inner.session.user_id().await;
		let device_info = serde_json::to_value(self.inner.device_info.snapshot())?;

		let properties = properties
			.insert("session_id", session_id.clone())
			.insert("user_id", user_id)
			.insert(
				"timestamp",
				Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
			)
			.insert("device_info", device_info);

		let feed_id = match options.feed_id {
			Some(feed_id) => Some(feed_id),
			None => self.inner.feed_id.read().await.clone(),
		};

		let mut payload = EventPayload::new(self.inner.config.write_key.as_str(), session_id, event)
			.with_properties(properties.into_value())
			.with_feed_id(feed_id);
		if let Some(name) = options.event_name {
			payload = payload.with_name(name);
		}
		if let Some(description) = options.event_description {
			payload = payload.with_description(description);
		}

		if self.inner.config.debug {
			debug!(
				event_type = %payload.event_type,
				event_name = %payload.event_name,
				session_id = %payload.session_id,
				feed_id = ?payload.feed_id,
				"Tracking analytics event"
			);
		}

		self.inner.scheduler.enqueue(payload).await
	}

	/// Tracks `event` under `feed_id` instead of the instance feed.
	pub async fn track_with_feed(
		&self,
		event: &str,
		properties: Properties,
		feed_id: impl Into<String>,
	) -> Result<()> {
		self
			.track_with(event, properties, TrackOptions::new().feed_id(feed_id))
			.await
	}

	/// Tracks a `page_view`. `path`, `url` and `title` default to the host's
	/// [`PageContext`] when not supplied.
	pub async fn page(&self, properties: Properties) -> Result<()> {
		let properties = match &self.inner.page {
			Some(page) => properties
				.insert_if_absent("path", || page.path())
				.insert_if_absent("url", || page.url())
				.insert_if_absent("title", || page.title()),
			None => properties,
		};
		self.track("page_view", properties).await
	}

	/// Binds `user_id` to the session and tracks `user_identified` with the
	/// given traits.
	pub async fn identify(&self, user_id: impl Into<String>, traits: Properties) -> Result<()> {
		self.check_closed()?;
		self.inner.session.identify(user_id).await;
		self.track("user_identified", traits).await
	}

	/// Links `alias_id` to `previous_id`, or to the current user when none is
	/// given.
	pub async fn alias(&self, alias_id: impl Into<String>, previous_id: Option<String>) -> Result<()> {
		let previous_id = match previous_id {
			Some(id) => Some(id),
			None => self.inner.session.user_id().await,
		};
		let properties = Properties::new()
			.insert("alias_id", alias_id.into())
			.insert("previous_id", previous_id);
		self.track("user_aliased", properties).await
	}

	pub async fn group(&self, group_id: impl Into<String>, traits: Properties) -> Result<()> {
		self
			.track("group_joined", traits.insert("group_id", group_id.into()))
			.await
	}

	pub async fn screen(&self, screen_name: impl Into<String>, properties: Properties) -> Result<()> {
		self
			.track(
				"screen_view",
				properties.insert("screen_name", screen_name.into()),
			)
			.await
	}

	pub async fn set_user_properties(&self, properties: Properties) -> Result<()> {
		self.track("user_properties_updated", properties).await
	}

	/// Records how long `category`/`variable` took.
	pub async fn timing(
		&self,
		category: impl Into<String>,
		variable: impl Into<String>,
		duration: Duration,
		label: Option<String>,
	) -> Result<()> {
		let mut properties = Properties::new()
			.insert("category", category.into())
			.insert("variable", variable.into())
			.insert("duration_ms", u64::try_from(duration.as_millis()).unwrap_or(u64::MAX));
		if let Some(label) = label {
			properties = properties.insert("label", label);
		}
		self.track("timing", properties).await
	}

	pub async fn metric(
		&self,
		name: impl Into<String>,
		value: f64,
		unit: Option<String>,
	) -> Result<()> {
		let mut properties = Properties::new()
			.insert("metric_name", name.into())
			.insert("value", value);
		if let Some(unit) = unit {
			properties = properties.insert("unit", unit);
		}
		self.track("metric", properties).await
	}

	/// Drops the user binding and starts a new anonymous session.
	pub async fn reset(&self) -> Result<()> {
		self.check_closed()?;
		self.inner.session.reset().await;
		Ok(())
	}

	/// Sends queued events now, unless a batch is already in flight.
	pub async fn flush_queue(&self) -> FlushOutcome {
		self.inner.scheduler.flush().await
	}

	/// Flushes the whole queue when the host is hidden, waiting for a batch
	/// already in flight first. The beacon channel, if configured, carries
	/// the batches through teardown.
	pub async fn handle_visibility_change(&self, visibility: Visibility) {
		if visibility == Visibility::Hidden {
			let flushed = self.inner.scheduler.flush_all().await;
			debug!(flushed, "Host hidden, flushed analytics queue");
		}
	}

	pub async fn page_hide(&self) {
		self.handle_visibility_change(Visibility::Hidden).await;
	}

	pub fn device_info(&self) -> DeviceInfo {
		self.inner.device_info.snapshot()
	}

	pub fn session_id(&self) -> String {
		self.inner.session.session_id()
	}

	pub async fn user_id(&self) -> Option<String> {
		self.inner.session.user_id().await
	}

	pub async fn feed_id(&self) -> Option<String> {
		self.inner.feed_id.read().await.clone()
	}

	pub async fn set_feed_id(&self, feed_id: Option<String>) {
		*self.inner.feed_id.write().await = feed_id;
	}

	pub fn config(&self) -> &ClientConfig {
		&self.inner.config
	}

	/// HTTP client tagged with this instance's session header, for host
	/// requests that should be correlated with the analytics session.
	pub fn http_client(&self) -> &InterceptedClient {
		&self.inner.http
	}

	pub async fn queue_len(&self) -> usize {
		self.inner.scheduler.queue_len().await
	}

	/// Waits for the batch currently being delivered, if any.
	pub async fn wait_idle(&self) {
		self.inner.scheduler.wait_idle().await;
	}

	/// Waits for the startup drain of persisted events. Returns `None` when
	/// persistence is disabled, the drain failed, or it was already awaited.
	pub async fn wait_for_offline_drain(&self) -> Option<DrainReport> {
		let handle = self.inner.drain_handle.lock().await.take()?;
		match handle.await {
			Ok(report) => report,
			Err(e) => {
				warn!(error = %e, "Offline drain task failed");
				None
			}
		}
	}

	/// Delivers everything still queued, stops the scheduler and removes the
	/// session header interceptor. Later tracking calls fail with
	/// [`AnalyticsError::ClientShutdown`].
	pub async fn shutdown(&self) -> Result<()> {
		if self.inner.closed.swap(true, Ordering::SeqCst) {
			return Ok(());
		}

		info!("Shutting down analytics client");

		self.inner.scheduler.shutdown().await;
		if let Some(handle) = self.inner.run_handle.lock().await.take() {
			if let Err(e) = handle.await {
				warn!(error = %e, "Analytics scheduler task failed");
			}
		}

		self.inner.http.remove(self.inner.interceptor);

		info!("Analytics client shut down");
		Ok(())
	}

	pub fn is_closed(&self) -> bool {
		self.inner.closed.load(Ordering::SeqCst)
	}

	fn check_closed(&self) -> Result<()> {
		if self.is_closed() {
			Err(AnalyticsError::ClientShutdown)
		} else {
			Ok(())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use augur_analytics_core::{
		BrowserInfo, DeviceDetails, DeviceType, LocationInfo, OsInfo, StaticDeviceInfo,
	};

	fn builder() -> AnalyticsClientBuilder {
		AnalyticsClient::builder()
			.write_key("wk_test")
			.endpoint("http://127.0.0.1:9/")
			.storage(Arc::new(MemoryStore::new()))
			.batch_timeout(Duration::from_secs(3600))
	}

	fn fixed_device() -> DeviceInfo {
		DeviceInfo {
			browser: BrowserInfo {
				name: "Firefox".to_string(),
				version: "128.0".to_string(),
			},
			os: OsInfo {
				name: "Linux".to_string(),
				version: "Unknown".to_string(),
			},
			device: DeviceDetails {
				device_type: DeviceType::Desktop,
				model: None,
			},
			screen: ScreenInfo::default(),
			location: LocationInfo {
				country: None,
				timezone: "UTC".to_string(),
				language: "en-US".to_string(),
			},
			user_agent: "test".to_string(),
		}
	}

	#[tokio::test]
	async fn test_builder_requires_write_key() {
		let result = AnalyticsClient::builder()
			.endpoint("https://ingest.example.com")
			.build()
			.await;
		assert!(matches!(result, Err(AnalyticsError::InvalidWriteKey)));
	}

	#[tokio::test]
	async fn test_builder_requires_endpoint() {
		let result = AnalyticsClient::builder().write_key("wk_test").build().await;
		assert!(matches!(result, Err(AnalyticsError::InvalidEndpoint)));
	}

	#[tokio::test]
	async fn test_builder_applies_init_object() {
		let config: ClientConfig = serde_json::from_str(
			r#"{"writeKey": "wk_json", "endpoint": "http://127.0.0.1:9", "feedId": "F1", "enablePersistence": false}"#,
		)
		.unwrap();
		let client = AnalyticsClient::builder().config(config).build().await.unwrap();

		assert_eq!(client.config().write_key, "wk_json");
		assert_eq!(client.feed_id().await.as_deref(), Some("F1"));
		assert!(client.wait_for_offline_drain().await.is_none());
		client.shutdown().await.unwrap();
	}

	#[tokio::test]
	async fn test_configured_session_id_wins() {
		let client = builder().session_id("sess-from-host").build().await.unwrap();
		assert_eq!(client.session_id(), "sess-from-host");
		client.shutdown().await.unwrap();
	}

	#[tokio::test]
	async fn test_track_queues_event() {
		let client = builder().build().await.unwrap();

		client.track("e1", Properties::new()).await.unwrap();
		client
			.timing("api", "load", Duration::from_millis(120), None)
			.await
			.unwrap();

		assert_eq!(client.queue_len().await, 2);
	}

	#[tokio::test]
	async fn test_shutdown_rejects_tracking() {
		let client = builder().enable_persistence(false).build().await.unwrap();
		client.shutdown().await.unwrap();

		assert!(client.is_closed());
		assert!(matches!(
			client.track("e1", Properties::new()).await,
			Err(AnalyticsError::ClientShutdown)
		));
		assert!(matches!(
			client.reset().await,
			Err(AnalyticsError::ClientShutdown)
		));
	}

	#[tokio::test]
	async fn test_double_shutdown_is_ok() {
		let client = builder().enable_persistence(false).build().await.unwrap();
		client.shutdown().await.unwrap();
		client.shutdown().await.unwrap();
	}

	#[tokio::test]
	async fn test_session_interceptor_lives_until_shutdown() {
		let client = builder().enable_persistence(false).build().await.unwrap();
		assert_eq!(client.http_client().interceptor_count(), 1);

		client.shutdown().await.unwrap();
		assert_eq!(client.http_client().interceptor_count(), 0);
	}

	#[tokio::test]
	async fn test_drop_without_shutdown_stops_scheduler() {
		let client = builder().enable_persistence(false).build().await.unwrap();
		let http = client.http_client().clone();
		let scheduler = Arc::clone(&client.inner.scheduler);
		let copy = client.clone();

		drop(client);
		assert_eq!(http.interceptor_count(), 1);

		drop(copy);
		assert_eq!(http.interceptor_count(), 0);
		tokio::time::timeout(Duration::from_secs(1), async {
			while Arc::strong_count(&scheduler) > 1 {
				tokio::time::sleep(Duration::from_millis(5)).await;
			}
		})
		.await
		.unwrap();
	}

	#[tokio::test]
	async fn test_reset_rotates_session_and_forgets_user() {
		let client = builder().user_id("bob@example.com").build().await.unwrap();
		let before = client.session_id();

		client.reset().await.unwrap();

		assert_ne!(client.session_id(), before);
		assert!(client.user_id().await.is_none());
	}

	#[tokio::test]
	async fn test_device_info_comes_from_provider() {
		let client = builder()
			.device_info(Arc::new(StaticDeviceInfo(fixed_device())))
			.build()
			.await
			.unwrap();
		assert_eq!(client.device_info(), fixed_device());
	}

	#[test]
	fn test_track_options_builder() {
		let options = TrackOptions::new()
			.feed_id("F2")
			.event_name("Signup")
			.event_description("user signed up");
		assert_eq!(options.feed_id.as_deref(), Some("F2"));
		assert_eq!(options.event_name.as_deref(), Some("Signup"));
		assert_eq!(options.event_description.as_deref(), Some("user signed up"));
	}

	#[test]
	fn test_host_environment_uses_sdk_user_agent() {
		let env = host_environment();
		assert!(env.user_agent.starts_with("augur/"));
		assert!(!env.language.is_empty());
	}
}
