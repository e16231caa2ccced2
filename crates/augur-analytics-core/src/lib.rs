// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for Augur event tracking.
//!
//! This crate holds the types shared between the client SDK (`augur-analytics`)
//! and anything that reads its wire format or its durable storage:
//!
//! - [`EventPayload`]: one event as posted to `/api/v1/analytics/events`
//! - [`SessionRecord`]: the persisted session identity and its sliding expiry
//! - [`DeviceInfo`]: a point-in-time device snapshot, produced by a
//!   [`DeviceInfoProvider`] such as the ordered-rule [`UserAgentDeviceProvider`]
//! - [`keys`]: the durable storage layout
//!
//! # Example
//!
//! ```
//! use augur_analytics_core::{generate_session_id, SessionRecord};
//! use chrono::Utc;
//!
//! let now = Utc::now();
//! let id = generate_session_id(Some("alice@example.com"), now);
//! assert!(id.starts_with("sess-alice-"));
//!
//! let record = SessionRecord::new(id, now);
//! assert!(!record.is_expired(now, std::time::Duration::from_secs(1800)));
//! ```

pub mod device;
pub mod error;
pub mod event;
pub mod keys;
pub mod session;

pub use device::{
	BrowserInfo, DeviceDetails, DeviceInfo, DeviceInfoProvider, DeviceType, EnvironmentSnapshot,
	LocationInfo, OsInfo, ScreenInfo, StaticDeviceInfo, UserAgentDeviceProvider,
};
pub use error::{CoreError, Result};
pub use event::{decode_batch, encode_batch, EventPayload, EVENTS_PATH, EVENT_SOURCE};
pub use session::{generate_session_id, SessionRecord};
