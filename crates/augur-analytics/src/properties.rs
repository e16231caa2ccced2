// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Helper for building event properties and user traits.

use serde_json::{Map, Value};

/// A builder for event properties.
///
/// # Example
///
/// ```
/// use augur_analytics::Properties;
///
/// let props = Properties::new()
///     .insert("button", "checkout")
///     .insert("cart_value", 99.99)
///     .insert("first_purchase", true);
/// assert_eq!(props.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
	inner: Map<String, Value>,
}

impl Properties {
	pub fn new() -> Self {
		Self { inner: Map::new() }
	}

	/// Inserts a key-value pair, replacing any previous value for the key.
	pub fn insert<K, V>(mut self, key: K, value: V) -> Self
	where
		K: Into<String>,
		V: Into<Value>,
	{
		self.inner.insert(key.into(), value.into());
		self
	}

	/// Inserts a value only if the key is not present yet.
	///
	/// The value is computed lazily, so callers can defer lookups that are
	/// only needed as defaults.
	pub fn insert_if_absent<K, V, F>(mut self, key: K, value: F) -> Self
	where
		K: Into<String>,
		V: Into<Value>,
		F: FnOnce() -> V,
	{
		self.inner.entry(key.into()).or_insert_with(|| value().into());
		self
	}

	/// Merges another Properties into this one; `other` wins on conflicts.
	pub fn merge(mut self, other: Properties) -> Self {
		self.inner.extend(other.inner);
		self
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	pub fn len(&self) -> usize {
		self.inner.len()
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.inner.get(key)
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.inner.contains_key(key)
	}

	pub fn into_value(self) -> Value {
		Value::Object(self.inner)
	}
}

impl From<Properties> for Value {
	fn from(props: Properties) -> Self {
		props.into_value()
	}
}

/// Non-object values carry no properties and convert to an empty set.
impl From<Value> for Properties {
	fn from(value: Value) -> Self {
		match value {
			Value::Object(map) => Self { inner: map },
			_ => Self::new(),
		}
	}
}

impl From<Map<String, Value>> for Properties {
	fn from(map: Map<String, Value>) -> Self {
		Self { inner: map }
	}
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Properties {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		iter
			.into_iter()
			.fold(Properties::new(), |props, (k, v)| props.insert(k, v))
	}
}
