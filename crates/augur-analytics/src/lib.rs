// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Augur event tracking client.
//!
//! Batches application events, attaches session and device context, and
//! delivers them to an ingestion endpoint, persisting what cannot be
//! delivered so the next start can send it.
//!
//! # Features
//!
//! - **Batching**: flush on batch size, on a timer, on demand or when the
//!   host is hidden, with a single batch in flight at a time
//! - **Sessions**: sliding-window session ids that survive restarts
//! - **Reliable delivery**: beacon channel first, HTTP fallback, linear
//!   retry, then offline persistence replayed on the next start
//! - **Request tagging**: every request through the client's HTTP client
//!   carries `X-Augur-Session-ID`
//!
//! # Example
//!
//! ```ignore
//! use augur_analytics::{AnalyticsClient, Properties, TrackOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = AnalyticsClient::builder()
//!         .write_key("wk_live_xxx")
//!         .endpoint("https://ingest.example.com")
//!         .feed_id("web")
//!         .build()
//!         .await?;
//!
//!     client.page(Properties::new()).await?;
//!     client
//!         .track_with(
//!             "checkout_completed",
//!             Properties::new().insert("total", 42.5),
//!             TrackOptions::new().event_name("Checkout completed"),
//!         )
//!         .await?;
//!
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod batch;
mod client;
mod config;
mod delivery;
mod error;
mod host;
mod persistence;
mod properties;
mod session;
mod storage;
mod transport;

pub use batch::{BatchConfig, FlushOutcome};
pub use client::{AnalyticsClient, AnalyticsClientBuilder, TrackOptions, SESSION_HEADER};
pub use config::ClientConfig;
pub use error::{AnalyticsError, Result};
pub use host::{PageContext, StaticPage, Visibility};
pub use persistence::{DrainReport, OfflineStore};
pub use properties::Properties;
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use transport::{BeaconChannel, DetachedBeacon, MAX_BEACON_PAYLOAD_BYTES};

// Re-export core types for convenience
pub use augur_analytics_core::{
	DeviceInfo, DeviceInfoProvider, DeviceType, EnvironmentSnapshot, EventPayload, StaticDeviceInfo,
	UserAgentDeviceProvider,
};
pub use augur_common_http::InterceptedClient;
