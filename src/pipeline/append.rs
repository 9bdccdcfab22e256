//! Bounded log appender with the watermark dedup guard.

use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::{Entry, LogRecord, RecordId, StreamConfig, Watermark};
use crate::storage::{ListingStore, bounded};

use super::batch::Batch;

/// Outcome of appending one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendSummary {
    /// Ids assigned by the store, in append order
    pub appended: Vec<RecordId>,
    /// Entries at or below the watermark time
    pub skipped_stale: usize,
    /// Entries the store refused as older than its newest record
    pub skipped_out_of_order: usize,
}

/// Appends entries to the capped log.
pub struct LogAppender<'a> {
    store: &'a dyn ListingStore,
    stream_key: &'a str,
    capacity: usize,
    timeout: Duration,
}

impl<'a> LogAppender<'a> {
    pub fn new(
        store: &'a dyn ListingStore,
        stream_key: &'a str,
        capacity: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            stream_key,
            capacity,
            timeout,
        }
    }

    pub fn from_config(store: &'a dyn ListingStore, stream: &'a StreamConfig) -> Self {
        Self::new(
            store,
            &stream.stream_key,
            stream.capacity,
            stream.store_timeout(),
        )
    }

    /// Append a single entry, id time taken from `epoch_seconds`.
    pub async fn append(&self, entry: &Entry) -> Result<LogRecord> {
        bounded(
            self.timeout,
            "append",
            self.store.append(
                self.stream_key,
                entry.epoch_seconds,
                entry.to_fields(),
                self.capacity,
            ),
        )
        .await
    }

    /// Append every entry of `batch` newer than `watermark`, in order.
    ///
    /// Store failures abort immediately; records appended before the failure
    /// stay in the log.
    pub async fn append_new(&self, batch: &Batch, watermark: Watermark) -> Result<AppendSummary> {
        let mut summary = AppendSummary::default();

        for entry in batch {
            if !watermark.admits(entry.epoch_seconds) {
                log::debug!(
                    "Skipping '{}' at {}: not newer than watermark {}",
                    entry.heading,
                    entry.epoch_seconds,
                    watermark
                );
                summary.skipped_stale += 1;
                continue;
            }

            match self.append(entry).await {
                Ok(record) => summary.appended.push(record.id),
                Err(AppError::OutOfOrder { requested, top }) => {
                    log::warn!(
                        "Store refused '{}' at {}: log top is already {}",
                        entry.heading,
                        requested,
                        top
                    );
                    summary.skipped_out_of_order += 1;
                }
                Err(e) => return Err(e),
            }
        }

        log::info!(
            "Appended {} entries to '{}' ({} stale, {} out of order)",
            summary.appended.len(),
            self.stream_key,
            summary.skipped_stale,
            summary.skipped_out_of_order
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    const STREAM: &str = "stream:test";

    fn entry(epoch_seconds: i64) -> Entry {
        Entry {
            heading: format!("listing {epoch_seconds}"),
            link: format!("https://example.org/{epoch_seconds}.html"),
            price: "$1".to_string(),
            distance: "1mi".to_string(),
            raw_timestamp: String::new(),
            epoch_seconds,
            image_url: String::new(),
        }
    }

    fn appender(store: &MemoryStore) -> LogAppender<'_> {
        LogAppender::new(store, STREAM, 50, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_guard_skips_entries_at_or_below_watermark() {
        let store = MemoryStore::new();
        let batch = Batch::build(vec![entry(150), entry(200), entry(250)]);
        let watermark = Watermark::new(RecordId::new(200, 0));

        let summary = appender(&store).append_new(&batch, watermark).await.unwrap();
        assert_eq!(summary.appended, vec![RecordId::new(250, 0)]);
        assert_eq!(summary.skipped_stale, 2);
        assert_eq!(store.len(STREAM).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_same_second_entries_get_distinct_ids() {
        let store = MemoryStore::new();
        let batch = Batch::build(vec![entry(300), entry(300)]);
        let summary = appender(&store)
            .append_new(&batch, Watermark::INITIAL)
            .await
            .unwrap();
        assert_eq!(
            summary.appended,
            vec![RecordId::new(300, 0), RecordId::new(300, 1)]
        );
    }

    #[tokio::test]
    async fn test_out_of_order_is_skipped_not_fatal() {
        let store = MemoryStore::new();
        // A previous run appended 500 but never saved its watermark
        store.append(STREAM, 500, Vec::new(), 50).await.unwrap();

        let batch = Batch::build(vec![entry(400), entry(600)]);
        let summary = appender(&store)
            .append_new(&batch, Watermark::INITIAL)
            .await
            .unwrap();
        assert_eq!(summary.skipped_out_of_order, 1);
        assert_eq!(summary.appended, vec![RecordId::new(600, 0)]);
    }

    #[tokio::test]
    async fn test_store_failure_keeps_prefix() {
        let store = MemoryStore::new();
        store.fail_after_appends(1);
        let batch = Batch::build(vec![entry(100), entry(200), entry(300)]);

        let err = appender(&store)
            .append_new(&batch, Watermark::INITIAL)
            .await
            .unwrap_err();
        assert!(err.is_store_failure());

        store.set_unavailable(false);
        let kept = store.range_after(STREAM, RecordId::ZERO).await.unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, RecordId::new(100, 0));
    }
}
