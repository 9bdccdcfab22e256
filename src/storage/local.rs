//! Local filesystem storage implementation.
//!
//! Persists scalar keys and bounded logs as JSON documents under a root
//! directory. Every write goes through a temp file and an atomic rename, so a
//! crash mid-write leaves the previous document intact.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── keys.json             # Scalar keys (watermark)
//! └── streams/
//!     └── {stream}.json     # StreamLog document per bounded log
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{LogRecord, RecordId};
use crate::storage::{DEFAULT_TRIM_SLACK, ListingStore, StreamLog};

const KEYS_FILE: &str = "keys.json";

/// Local filesystem storage backend.
#[derive(Debug)]
pub struct LocalStorage {
    root_dir: PathBuf,
    trim_slack: usize,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self::with_trim_slack(root_dir, DEFAULT_TRIM_SLACK)
    }

    /// Create a LocalStorage that tolerates `trim_slack` records above capacity.
    pub fn with_trim_slack(root_dir: impl Into<PathBuf>, trim_slack: usize) -> Self {
        Self {
            root_dir: root_dir.into(),
            trim_slack,
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Relative path of the document backing a stream.
    fn stream_key(stream: &str) -> String {
        let name: String = stream
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("streams/{name}.json")
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_failure)?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await.map_err(io_failure)?;
        file.write_all(bytes).await.map_err(io_failure)?;
        file.flush().await.map_err(io_failure)?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await.map_err(io_failure)?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_failure(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn load_keys(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.read_json(KEYS_FILE).await?.unwrap_or_default())
    }

    async fn load_stream(&self, stream: &str) -> Result<StreamLog> {
        Ok(self
            .read_json(&Self::stream_key(stream))
            .await?
            .unwrap_or_default())
    }
}

/// Filesystem failures mean the store cannot serve the run.
fn io_failure(e: std::io::Error) -> AppError {
    AppError::store_unavailable(format!("local storage I/O: {e}"))
}

#[async_trait]
impl ListingStore for LocalStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load_keys().await?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut keys = self.load_keys().await?;
        keys.insert(key.to_string(), value.to_string());
        self.write_json(KEYS_FILE, &keys).await
    }

    async fn append(
        &self,
        stream: &str,
        time: i64,
        fields: Vec<(String, String)>,
        capacity: usize,
    ) -> Result<LogRecord> {
        let _guard = self.write_lock.lock().await;
        let mut log = self.load_stream(stream).await?;
        let record = log.append(time, fields, capacity, self.trim_slack)?;
        self.write_json(&Self::stream_key(stream), &log).await?;
        Ok(record)
    }

    async fn tail(&self, stream: &str, count: usize) -> Result<Vec<LogRecord>> {
        Ok(self.load_stream(stream).await?.tail(count))
    }

    async fn range_after(&self, stream: &str, after: RecordId) -> Result<Vec<LogRecord>> {
        Ok(self.load_stream(stream).await?.range_after(after))
    }

    async fn len(&self, stream: &str) -> Result<usize> {
        Ok(self.load_stream(stream).await?.records.len())
    }
}
