//! Storage abstractions for the watermark and the bounded log.
//!
//! The pipeline only needs two capabilities from persistence:
//! - Scalar get/set of a string under a well-known key (the watermark)
//! - A capped append-only log with time-ordered ids, tail reads and
//!   forward range reads
//!
//! ## Directory Structure (`LocalStorage`)
//!
//! ```text
//! storage/
//! ├── config.toml           # Configuration
//! ├── keys.json             # Scalar keys (watermark)
//! └── streams/
//!     └── stream_craigslist.json   # Bounded log records, oldest first
//! ```

pub mod local;
pub mod memory;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{LogRecord, RecordId};

// Re-export for convenience
pub use local::LocalStorage;
pub use memory::MemoryStore;

/// Default number of records a store may hold above the requested capacity
/// before it trims.
pub const DEFAULT_TRIM_SLACK: usize = 10;

/// Trait for watermark and bounded log backends.
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Read a scalar value, `None` when the key was never written.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite a scalar value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Append one record stamped at `time` and trim the log to roughly
    /// `capacity` records in the same operation.
    ///
    /// The store assigns the sequence part of the id. Fails with
    /// [`AppError::OutOfOrder`] when `time` is older than the newest record.
    async fn append(
        &self,
        stream: &str,
        time: i64,
        fields: Vec<(String, String)>,
        capacity: usize,
    ) -> Result<LogRecord>;

    /// The newest `count` records, newest first.
    async fn tail(&self, stream: &str, count: usize) -> Result<Vec<LogRecord>>;

    /// All records with an id strictly greater than `after`, oldest first.
    async fn range_after(&self, stream: &str, after: RecordId) -> Result<Vec<LogRecord>>;

    /// Number of records currently retained.
    async fn len(&self, stream: &str) -> Result<usize>;
}

/// Run a store call under a deadline; an elapsed deadline is reported as
/// [`AppError::StoreUnavailable`].
pub async fn bounded<T, F>(timeout: Duration, op: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::store_unavailable(format!(
            "{op} timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

/// In-order record list with Redis-stream style id assignment and
/// approximate trimming. Shared by the store backends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamLog {
    /// Id of the newest record ever appended, kept across trims
    #[serde(default)]
    pub last_id: Option<RecordId>,
    /// Retained records, oldest first
    #[serde(default)]
    pub records: Vec<LogRecord>,
}

impl StreamLog {
    /// Assign the next id for `time`.
    pub fn next_id(&self, time: i64) -> Result<RecordId> {
        match self.last_id {
            Some(top) if time < top.time => Err(AppError::OutOfOrder {
                requested: time,
                top,
            }),
            Some(top) if time == top.time => Ok(top.next_in_second()),
            _ => Ok(RecordId::new(time, 0)),
        }
    }

    /// Append and trim. Trimming only kicks in once the log exceeds
    /// `capacity + slack`, then evicts the oldest records down to `capacity`.
    pub fn append(
        &mut self,
        time: i64,
        fields: Vec<(String, String)>,
        capacity: usize,
        slack: usize,
    ) -> Result<LogRecord> {
        let id = self.next_id(time)?;
        let record = LogRecord::new(id, fields);
        self.records.push(record.clone());
        self.last_id = Some(id);

        if self.records.len() > capacity.saturating_add(slack) {
            let excess = self.records.len() - capacity;
            self.records.drain(..excess);
        }
        Ok(record)
    }

    pub fn tail(&self, count: usize) -> Vec<LogRecord> {
        self.records.iter().rev().take(count).cloned().collect()
    }

    pub fn range_after(&self, after: RecordId) -> Vec<LogRecord> {
        let start = self.records.partition_point(|r| r.id <= after);
        self.records[start..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(n: i64) -> Vec<(String, String)> {
        vec![("heading".to_string(), format!("listing {n}"))]
    }

    #[test]
    fn test_ids_disambiguate_same_second() {
        let mut log = StreamLog::default();
        let a = log.append(100, fields(1), 50, 0).unwrap();
        let b = log.append(100, fields(2), 50, 0).unwrap();
        let c = log.append(101, fields(3), 50, 0).unwrap();
        assert_eq!(a.id, RecordId::new(100, 0));
        assert_eq!(b.id, RecordId::new(100, 1));
        assert_eq!(c.id, RecordId::new(101, 0));
    }

    #[test]
    fn test_older_append_rejected() {
        let mut log = StreamLog::default();
        log.append(200, fields(1), 50, 0).unwrap();
        let err = log.append(150, fields(2), 50, 0).unwrap_err();
        assert!(matches!(err, AppError::OutOfOrder { requested: 150, .. }));
        assert_eq!(log.records.len(), 1);
    }

    #[test]
    fn test_trim_respects_slack_and_order() {
        let mut log = StreamLog::default();
        for t in 1..=14 {
            log.append(t, fields(t), 10, 4).unwrap();
        }
        // 14 <= 10 + 4, nothing trimmed yet
        assert_eq!(log.records.len(), 14);

        log.append(15, fields(15), 10, 4).unwrap();
        assert_eq!(log.records.len(), 10);
        assert_eq!(log.records.first().unwrap().id, RecordId::new(6, 0));
        assert_eq!(log.records.last().unwrap().id, RecordId::new(15, 0));
    }

    #[test]
    fn test_ids_stay_monotonic_after_trim() {
        let mut log = StreamLog::default();
        log.append(10, fields(1), 1, 0).unwrap();
        log.append(10, fields(2), 1, 0).unwrap();
        assert_eq!(log.records.len(), 1);
        let next = log.append(10, fields(3), 1, 0).unwrap();
        assert_eq!(next.id, RecordId::new(10, 2));
    }

    #[test]
    fn test_tail_and_range() {
        let mut log = StreamLog::default();
        for t in [100, 200, 300] {
            log.append(t, fields(t), 50, 0).unwrap();
        }
        let tail = log.tail(1);
        assert_eq!(tail[0].id, RecordId::new(300, 0));

        let after: Vec<i64> = log
            .range_after(RecordId::new(100, 0))
            .iter()
            .map(|r| r.id.time)
            .collect();
        assert_eq!(after, vec![200, 300]);

        // A cursor that was trimmed away still yields everything newer
        assert_eq!(log.range_after(RecordId::new(50, 0)).len(), 3);
        assert!(log.range_after(RecordId::new(300, 0)).is_empty());
    }

    #[tokio::test]
    async fn test_bounded_times_out_as_store_unavailable() {
        let result: Result<()> = bounded(Duration::from_millis(10), "get", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(AppError::StoreUnavailable(_))));
    }
}
