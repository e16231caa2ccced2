// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Key-value storage backends for session and failed-delivery records.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, PoisonError, Weak};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Live file stores by path, so clients in one process serialize their
/// writes to the same file.
static SHARED_FILE_STORES: LazyLock<std::sync::Mutex<HashMap<PathBuf, Weak<FileStore>>>> =
	LazyLock::new(Default::default);

/// Errors raised by a storage backend.
///
/// Callers inside the client never propagate these; they log them and fall
/// back to in-memory behaviour.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
	#[error("IO error: {0}")]
	Io(String),

	#[error("Serialization error: {0}")]
	Serde(String),

	#[error("Storage unavailable: {0}")]
	Unavailable(String),
}

impl From<std::io::Error> for StorageError {
	fn from(err: std::io::Error) -> Self {
		StorageError::Io(err.to_string())
	}
}

impl From<serde_json::Error> for StorageError {
	fn from(err: serde_json::Error) -> Self {
		StorageError::Serde(err.to_string())
	}
}

/// A string key-value store shared by every client using the same backing
/// location.
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
	async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

	async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

	async fn remove(&self, key: &str) -> Result<(), StorageError>;

	/// All keys currently stored, in no particular order.
	async fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// Single JSON file holding every key.
///
/// Every write goes to its own temporary file in the same directory, which is
/// then renamed over the original. Readers and other processes only ever see
/// a complete file.
#[derive(Debug)]
pub struct FileStore {
	path: PathBuf,
	write_lock: Mutex<()>,
}

impl FileStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			write_lock: Mutex::new(()),
		}
	}

	/// The store for `path` shared by everything in this process that is
	/// still holding it, or a new one.
	pub fn shared(path: impl Into<PathBuf>) -> Arc<Self> {
		let path = path.into();
		let mut stores = SHARED_FILE_STORES
			.lock()
			.unwrap_or_else(PoisonError::into_inner);
		stores.retain(|_, store| store.strong_count() > 0);

		if let Some(store) = stores.get(&path).and_then(Weak::upgrade) {
			return store;
		}

		let store = Arc::new(Self::new(path.clone()));
		stores.insert(path, Arc::downgrade(&store));
		store
	}

	/// `<local data dir>/augur/storage.json`, if the platform has one.
	pub fn default_path() -> Option<PathBuf> {
		dirs::data_local_dir().map(|dir| dir.join("augur").join("storage.json"))
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	async fn read_all(&self) -> Result<HashMap<String, String>, StorageError> {
		if !fs::try_exists(&self.path).await? {
			return Ok(HashMap::new());
		}

		let contents = fs::read_to_string(&self.path).await?;
		if contents.trim().is_empty() {
			return Ok(HashMap::new());
		}
		Ok(serde_json::from_str(&contents)?)
	}

	/// Current entries for a read-modify-write. A file that does not parse is
	/// treated as empty so the write replaces it.
	async fn read_for_update(&self) -> Result<HashMap<String, String>, StorageError> {
		match self.read_all().await {
			Err(StorageError::Serde(e)) => {
				debug!(path = ?self.path, error = %e, "Overwriting unreadable storage file");
				Ok(HashMap::new())
			}
			result => result,
		}
	}

	async fn write_all(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
		let contents = serde_json::to_string(entries)?;
		let path = self.path.clone();

		tokio::task::spawn_blocking(move || replace_file(&path, contents.as_bytes()))
			.await
			.map_err(|e| StorageError::Unavailable(e.to_string()))??;

		debug!(path = ?self.path, keys = entries.len(), "Storage file written");
		Ok(())
	}
}

fn replace_file(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
	let dir = match path.parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent,
		_ => Path::new("."),
	};
	std::fs::create_dir_all(dir)?;

	let mut file = NamedTempFile::new_in(dir)?;
	file.write_all(contents)?;
	file.as_file().sync_all()?;
	file.persist(path).map_err(|e| StorageError::from(e.error))?;
	Ok(())
}

#[async_trait]
impl KeyValueStore for FileStore {
	async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
		Ok(self.read_all().await?.remove(key))
	}

	async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		let mut entries = self.read_for_update().await?;
		entries.insert(key.to_string(), value.to_string());
		self.write_all(&entries).await
	}

	async fn remove(&self, key: &str) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		let mut entries = self.read_for_update().await?;
		if entries.remove(key).is_none() {
			return Ok(());
		}
		self.write_all(&entries).await
	}

	async fn keys(&self) -> Result<Vec<String>, StorageError> {
		Ok(self.read_all().await?.into_keys().collect())
	}
}

/// In-memory store, for tests and hosts without durable storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
	entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl KeyValueStore for MemoryStore {
	async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
		Ok(self.entries.read().await.get(key).cloned())
	}

	async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
		self
			.entries
			.write()
			.await
			.insert(key.to_string(), value.to_string());
		Ok(())
	}

	async fn remove(&self, key: &str) -> Result<(), StorageError> {
		self.entries.write().await.remove(key);
		Ok(())
	}

	async fn keys(&self) -> Result<Vec<String>, StorageError> {
		Ok(self.entries.read().await.keys().cloned().collect())
	}
}
