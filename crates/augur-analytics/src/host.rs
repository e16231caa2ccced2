// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! What the client needs to know about the page or screen hosting it.

/// Current location, used to default `page` properties.
pub trait PageContext: Send + Sync {
	fn path(&self) -> String;
	fn url(&self) -> String;
	fn title(&self) -> String;
}

/// A fixed location, for hosts without navigation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticPage {
	pub path: String,
	pub url: String,
	pub title: String,
}

impl StaticPage {
	pub fn new(path: impl Into<String>, url: impl Into<String>, title: impl Into<String>) -> Self {
		Self {
			path: path.into(),
			url: url.into(),
			title: title.into(),
		}
	}
}

impl PageContext for StaticPage {
	fn path(&self) -> String {
		self.path.clone()
	}

	fn url(&self) -> String {
		self.url.clone()
	}

	fn title(&self) -> String {
		self.title.clone()
	}
}

/// Host visibility, as reported through
/// [`AnalyticsClient::handle_visibility_change`](crate::AnalyticsClient::handle_visibility_change).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
	Visible,
	/// The host is being hidden or torn down; pending events are flushed.
	Hidden,
}
