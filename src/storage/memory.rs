//! In-memory storage implementation.
//!
//! Used for dry runs and tests. Supports simulating an unreachable store so
//! failure paths can be exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{LogRecord, RecordId};
use crate::storage::{DEFAULT_TRIM_SLACK, ListingStore, StreamLog};

#[derive(Debug, Default)]
struct State {
    keys: HashMap<String, String>,
    streams: HashMap<String, StreamLog>,
}

/// In-memory store backend.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    trim_slack: usize,
    unavailable: AtomicBool,
    /// Appends allowed before the store starts failing; `usize::MAX` = never
    appends_until_failure: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_trim_slack(DEFAULT_TRIM_SLACK)
    }

    /// Create a store that tolerates `trim_slack` records above capacity.
    pub fn with_trim_slack(trim_slack: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            trim_slack,
            unavailable: AtomicBool::new(false),
            appends_until_failure: AtomicUsize::new(usize::MAX),
        }
    }

    /// Make every subsequent call fail with `StoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Let `count` more appends succeed, then become unavailable.
    pub fn fail_after_appends(&self, count: usize) {
        self.appends_until_failure.store(count, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::store_unavailable("memory store offline"));
        }
        Ok(())
    }

    fn consume_append_budget(&self) -> Result<()> {
        let remaining = self.appends_until_failure.load(Ordering::SeqCst);
        if remaining == usize::MAX {
            return Ok(());
        }
        if remaining == 0 {
            self.set_unavailable(true);
            return Err(AppError::store_unavailable("memory store offline"));
        }
        self.appends_until_failure
            .store(remaining - 1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ListingStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        Ok(self.state.lock().await.keys.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_available()?;
        self.state
            .lock()
            .await
            .keys
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn append(
        &self,
        stream: &str,
        time: i64,
        fields: Vec<(String, String)>,
        capacity: usize,
    ) -> Result<LogRecord> {
        self.check_available()?;
        self.consume_append_budget()?;
        let mut state = self.state.lock().await;
        state
            .streams
            .entry(stream.to_string())
            .or_default()
            .append(time, fields, capacity, self.trim_slack)
    }

    async fn tail(&self, stream: &str, count: usize) -> Result<Vec<LogRecord>> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .streams
            .get(stream)
            .map(|log| log.tail(count))
            .unwrap_or_default())
    }

    async fn range_after(&self, stream: &str, after: RecordId) -> Result<Vec<LogRecord>> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .streams
            .get(stream)
            .map(|log| log.range_after(after))
            .unwrap_or_default())
    }

    async fn len(&self, stream: &str) -> Result<usize> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.streams.get(stream).map_or(0, |log| log.records.len()))
    }
}
