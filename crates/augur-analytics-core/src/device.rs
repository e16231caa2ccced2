// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Device snapshots attached to every event.
//!
//! The client asks a [`DeviceInfoProvider`] for a fresh [`DeviceInfo`] each
//! time it assembles an event. [`UserAgentDeviceProvider`] derives one from
//! the ambient environment strings using ordered rule tables: each table is a
//! list of `{pattern, extractor}` rules evaluated top to bottom, and the first
//! rule whose pattern matches wins.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
	pub browser: BrowserInfo,
	pub os: OsInfo,
	pub device: DeviceDetails,
	pub screen: ScreenInfo,
	pub location: LocationInfo,
	pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserInfo {
	pub name: String,
	pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
	pub name: String,
	pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
	Desktop,
	Mobile,
	Tablet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDetails {
	#[serde(rename = "type")]
	pub device_type: DeviceType,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenInfo {
	pub width: u32,
	pub height: u32,
	pub pixel_ratio: f64,
}

impl Default for ScreenInfo {
	fn default() -> Self {
		Self {
			width: 0,
			height: 0,
			pixel_ratio: 1.0,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationInfo {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub country: Option<String>,
	pub timezone: String,
	pub language: String,
}

/// Supplies the device snapshot stamped into each event's properties.
pub trait DeviceInfoProvider: Send + Sync {
	fn snapshot(&self) -> DeviceInfo;
}

/// Always returns the same snapshot.
#[derive(Debug, Clone)]
pub struct StaticDeviceInfo(pub DeviceInfo);

impl DeviceInfoProvider for StaticDeviceInfo {
	fn snapshot(&self) -> DeviceInfo {
		self.0.clone()
	}
}

/// The raw strings and geometry a host environment exposes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironmentSnapshot {
	pub user_agent: String,
	pub screen: ScreenInfo,
	pub timezone: String,
	pub language: String,
	pub country: Option<String>,
}

/// Derives [`DeviceInfo`] from an [`EnvironmentSnapshot`] with the ordered
/// rule tables below.
#[derive(Debug, Clone)]
pub struct UserAgentDeviceProvider {
	environment: EnvironmentSnapshot,
}

impl UserAgentDeviceProvider {
	pub fn new(environment: EnvironmentSnapshot) -> Self {
		Self { environment }
	}

	/// Parses the snapshot's user agent into a full [`DeviceInfo`].
	pub fn parse(environment: &EnvironmentSnapshot) -> DeviceInfo {
		let ua = environment.user_agent.as_str();
		DeviceInfo {
			browser: first_match(&BROWSER_RULES, ua).unwrap_or_else(|| BrowserInfo {
				name: UNKNOWN.to_string(),
				version: UNKNOWN.to_string(),
			}),
			os: first_match(&OS_RULES, ua).unwrap_or_else(|| OsInfo {
				name: UNKNOWN.to_string(),
				version: UNKNOWN.to_string(),
			}),
			device: DeviceDetails {
				device_type: first_match(&DEVICE_TYPE_RULES, ua).unwrap_or(DeviceType::Desktop),
				model: first_match(&MODEL_RULES, ua),
			},
			screen: environment.screen.clone(),
			location: LocationInfo {
				country: environment.country.clone(),
				timezone: environment.timezone.clone(),
				language: environment.language.clone(),
			},
			user_agent: environment.user_agent.clone(),
		}
	}
}

impl DeviceInfoProvider for UserAgentDeviceProvider {
	fn snapshot(&self) -> DeviceInfo {
		Self::parse(&self.environment)
	}
}

struct Rule<T> {
	pattern: Regex,
	extract: fn(&Captures<'_>) -> T,
}

impl<T> Rule<T> {
	fn new(pattern: &str, extract: fn(&Captures<'_>) -> T) -> Self {
		Self {
			pattern: Regex::new(pattern).expect("user agent pattern must compile"),
			extract,
		}
	}
}

fn first_match<T>(rules: &[Rule<T>], input: &str) -> Option<T> {
	rules.iter().find_map(|rule| {
		rule
			.pattern
			.captures(input)
			.map(|captures| (rule.extract)(&captures))
	})
}

fn group(captures: &Captures<'_>, index: usize) -> String {
	captures
		.get(index)
		.map(|m| m.as_str().replace('_', "."))
		.unwrap_or_else(|| UNKNOWN.to_string())
}

fn browser(name: &str, captures: &Captures<'_>) -> BrowserInfo {
	BrowserInfo {
		name: name.to_string(),
		version: group(captures, 1),
	}
}

fn os(name: &str, captures: &Captures<'_>) -> OsInfo {
	OsInfo {
		name: name.to_string(),
		version: group(captures, 1),
	}
}

// Order matters: Edge and Opera also advertise Chrome, Chrome also advertises
// Safari.
static BROWSER_RULES: LazyLock<Vec<Rule<BrowserInfo>>> = LazyLock::new(|| {
	vec![
		Rule::new(r"Edg(?:e|A|iOS)?/([\d.]+)", |c| browser("Edge", c)),
		Rule::new(r"(?:OPR|Opera)/([\d.]+)", |c| browser("Opera", c)),
		Rule::new(r"SamsungBrowser/([\d.]+)", |c| browser("Samsung Internet", c)),
		Rule::new(r"(?:Firefox|FxiOS)/([\d.]+)", |c| browser("Firefox", c)),
		Rule::new(r"(?:Chrome|CriOS)/([\d.]+)", |c| browser("Chrome", c)),
		Rule::new(r"Version/([\d.]+).*Safari/", |c| browser("Safari", c)),
		Rule::new(r"(?:MSIE |Trident/.*rv:)([\d.]+)", |c| {
			browser("Internet Explorer", c)
		}),
	]
});

// iOS before macOS (iPad user agents say "like Mac OS X"), Android before Linux.
static OS_RULES: LazyLock<Vec<Rule<OsInfo>>> = LazyLock::new(|| {
	vec![
		Rule::new(r"Windows NT ([\d.]+)", |c| os("Windows", c)),
		Rule::new(r"(?:iPhone|iPad|iPod).*? OS ([\d_]+)", |c| os("iOS", c)),
		Rule::new(r"Mac OS X ([\d_.]+)", |c| os("macOS", c)),
		Rule::new(r"Android ([\d.]+)", |c| os("Android", c)),
		Rule::new(r"CrOS \S+ ([\d.]+)", |c| os("Chrome OS", c)),
		Rule::new(r"Linux", |c| os("Linux", c)),
	]
});

static DEVICE_TYPE_RULES: LazyLock<Vec<Rule<DeviceType>>> = LazyLock::new(|| {
	vec![
		Rule::new(r"iPad|Tablet|PlayBook|Silk", |_| DeviceType::Tablet),
		Rule::new(r"Android(.*)", |c| {
			if c.get(1).is_some_and(|rest| rest.as_str().contains("Mobile")) {
				DeviceType::Mobile
			} else {
				DeviceType::Tablet
			}
		}),
		Rule::new(r"Mobi|iPhone|iPod|BlackBerry|IEMobile|Opera Mini", |_| {
			DeviceType::Mobile
		}),
	]
});

static MODEL_RULES: LazyLock<Vec<Rule<String>>> = LazyLock::new(|| {
	vec![
		Rule::new(r"iPhone", |_| "iPhone".to_string()),
		Rule::new(r"iPad", |_| "iPad".to_string()),
		Rule::new(r"iPod", |_| "iPod".to_string()),
		Rule::new(r"Android [\d.]+; ([^;)]+?)(?: Build/[^;)]*)?[;)]", |c| group(c, 1)),
	]
});
