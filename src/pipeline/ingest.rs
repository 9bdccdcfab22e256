// src/pipeline/ingest.rs

//! Run orchestration.
//!
//! One run walks a fixed sequence of store operations:
//!
//! ```text
//! Start -> WatermarkLoaded -> EntriesAppended
//!       -> { NoChange | DeltaComputed -> WatermarkSaved }
//! ```
//!
//! There are no internal retries. A store failure aborts the run where it
//! happens; appends already made stay in the log and the previous watermark
//! stays in place, so the next run picks the work up again.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{MalformedEntry, Result};
use crate::models::{Config, Entry, RawListing, StreamConfig, Watermark};
use crate::services::{ListingExtractor, ListingFetcher, ListingSource};
use crate::storage::ListingStore;

use super::append::LogAppender;
use super::batch::Batch;
use super::delta::{DeltaResolver, RunOutcome};
use super::normalize::Normalizer;
use super::watermark::WatermarkClient;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Start,
    WatermarkLoaded,
    EntriesAppended,
    /// The log tail did not move past the watermark; terminal
    NoChange,
    /// Records past the watermark were read, not yet committed
    DeltaComputed,
    /// The advanced watermark is persisted; terminal
    WatermarkSaved,
}

impl RunPhase {
    /// A run that returned successfully ends in one of these.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::NoChange | Self::WatermarkSaved)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::WatermarkLoaded => "watermark loaded",
            Self::EntriesAppended => "entries appended",
            Self::NoChange => "no change",
            Self::DeltaComputed => "delta computed",
            Self::WatermarkSaved => "watermark saved",
        };
        f.write_str(name)
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Rows produced by extraction
    pub extracted: usize,
    /// Rows dropped by the normalizer
    pub malformed: usize,
    pub appended: usize,
    pub skipped_stale: usize,
    pub skipped_out_of_order: usize,
    pub previous_watermark: Watermark,
    pub new_watermark: Watermark,
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Terminal phase the run reached
    pub phase: RunPhase,
    pub stats: RunStats,
    /// Rows dropped by the normalizer, with reasons
    pub malformed: Vec<MalformedEntry>,
}

impl RunReport {
    pub fn is_nothing_new(&self) -> bool {
        self.outcome.is_nothing_new()
    }
}

/// Drives fetch, extraction and the store sequence for one stream.
pub struct Ingestor {
    store: Arc<dyn ListingStore>,
    stream: StreamConfig,
    normalizer: Normalizer,
}

impl Ingestor {
    pub fn new(store: Arc<dyn ListingStore>, stream: StreamConfig, normalizer: Normalizer) -> Self {
        Self {
            store,
            stream,
            normalizer,
        }
    }

    pub fn from_config(store: Arc<dyn ListingStore>, config: &Config) -> Result<Self> {
        Ok(Self::new(
            store,
            config.stream.clone(),
            Normalizer::from_config(config)?,
        ))
    }

    pub fn store(&self) -> &dyn ListingStore {
        self.store.as_ref()
    }

    pub fn stream(&self) -> &StreamConfig {
        &self.stream
    }

    /// Fetch every configured page, extract rows and ingest them.
    ///
    /// A fetch failure aborts before the store is touched.
    pub async fn run<S: ListingSource>(
        &self,
        fetcher: &ListingFetcher<S>,
        extractor: &ListingExtractor,
    ) -> Result<RunReport> {
        let pages = fetcher.fetch_all().await?;

        let mut raws = Vec::new();
        for page in &pages {
            raws.extend(extractor.extract_page(page)?);
        }
        log::info!("Extracted {} rows from {} pages", raws.len(), pages.len());

        self.ingest(raws).await
    }

    /// Normalize scraped rows and run them through the store sequence.
    pub async fn ingest<I>(&self, raws: I) -> Result<RunReport>
    where
        I: IntoIterator<Item = RawListing>,
    {
        let raws: Vec<RawListing> = raws.into_iter().collect();
        let extracted = raws.len();
        let (entries, malformed) = self.normalizer.normalize_all(raws);
        if !malformed.is_empty() {
            log::warn!("{} of {} rows were malformed", malformed.len(), extracted);
        }
        self.ingest_batch(Batch::build(entries), extracted, malformed)
            .await
    }

    /// Run already normalized entries through the store sequence.
    pub async fn ingest_entries(&self, entries: Vec<Entry>) -> Result<RunReport> {
        let extracted = entries.len();
        self.ingest_batch(Batch::build(entries), extracted, Vec::new())
            .await
    }

    async fn ingest_batch(
        &self,
        batch: Batch,
        extracted: usize,
        malformed: Vec<MalformedEntry>,
    ) -> Result<RunReport> {
        let store = self.store.as_ref();
        let timeout = self.stream.store_timeout();
        let watermarks = WatermarkClient::new(store, &self.stream.watermark_key, timeout);
        let appender = LogAppender::from_config(store, &self.stream);
        let resolver =
            DeltaResolver::new(store, &self.stream.stream_key, &watermarks, timeout);

        let mut phase = RunPhase::Start;
        let fail = |phase: RunPhase| {
            move |e: &crate::error::AppError| log::error!("Run aborted after '{phase}': {e}")
        };

        let previous = watermarks.load().await.inspect_err(fail(phase))?;
        phase = RunPhase::WatermarkLoaded;
        log::info!("Loaded watermark {previous}, batch of {}", batch.len());

        let summary = appender
            .append_new(&batch, previous)
            .await
            .inspect_err(fail(phase))?;
        phase = RunPhase::EntriesAppended;

        let resolution = resolver.compute(previous).await.inspect_err(fail(phase))?;
        phase = if resolution.outcome.is_nothing_new() {
            RunPhase::NoChange
        } else {
            RunPhase::DeltaComputed
        };

        if phase == RunPhase::DeltaComputed {
            resolver.commit(&resolution).await.inspect_err(fail(phase))?;
            phase = RunPhase::WatermarkSaved;
        }
        log::debug!("Run finished at '{phase}'");

        let stats = RunStats {
            extracted,
            malformed: malformed.len(),
            appended: summary.appended.len(),
            skipped_stale: summary.skipped_stale,
            skipped_out_of_order: summary.skipped_out_of_order,
            previous_watermark: previous,
            new_watermark: resolution.watermark,
        };

        Ok(RunReport {
            outcome: resolution.outcome,
            phase,
            stats,
            malformed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListingZone, RecordId};
    use crate::storage::MemoryStore;

    fn stream_config(capacity: usize) -> StreamConfig {
        StreamConfig {
            stream_key: "stream:test".to_string(),
            watermark_key: "stream:test:lastseen".to_string(),
            capacity,
            ..StreamConfig::default()
        }
    }

    fn ingestor(store: Arc<MemoryStore>, capacity: usize) -> Ingestor {
        let normalizer =
            Normalizer::new(ListingZone::Utc, "https://img.example/", ".jpg").unwrap();
        Ingestor::new(store, stream_config(capacity), normalizer)
    }

    fn entry(epoch_seconds: i64) -> Entry {
        Entry {
            heading: format!("listing {epoch_seconds}"),
            link: format!("https://example.org/{epoch_seconds}.html"),
            price: "$2,000".to_string(),
            distance: "3mi".to_string(),
            raw_timestamp: String::new(),
            epoch_seconds,
            image_url: String::new(),
        }
    }

    fn entries(times: &[i64]) -> Vec<Entry> {
        times.iter().map(|&t| entry(t)).collect()
    }

    fn delta_times(report: &RunReport) -> Vec<i64> {
        report.outcome.records().iter().map(|r| r.id.time).collect()
    }

    async fn stored_watermark(store: &MemoryStore) -> Option<String> {
        store.get("stream:test:lastseen").await.unwrap()
    }

    #[tokio::test]
    async fn test_first_run_emits_whole_batch() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(store.clone(), 50);

        let report = ingestor
            .ingest_entries(entries(&[300, 100, 200]))
            .await
            .unwrap();
        assert_eq!(report.stats.appended, 3);
        assert_eq!(delta_times(&report), vec![100, 200, 300]);
        assert_eq!(report.stats.new_watermark.id(), RecordId::new(300, 0));
        assert_eq!(stored_watermark(&store).await.as_deref(), Some("300-0"));
        assert_eq!(report.phase, RunPhase::WatermarkSaved);
    }

    #[tokio::test]
    async fn test_only_newer_entries_are_emitted() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(store.clone(), 50);
        ingestor.ingest_entries(entries(&[100, 200])).await.unwrap();

        let report = ingestor
            .ingest_entries(entries(&[150, 250, 400]))
            .await
            .unwrap();
        assert_eq!(report.stats.skipped_stale, 1);
        assert_eq!(report.stats.appended, 2);
        assert_eq!(delta_times(&report), vec![250, 400]);
        assert_eq!(stored_watermark(&store).await.as_deref(), Some("400-0"));
    }

    #[tokio::test]
    async fn test_nothing_new_leaves_watermark() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(store.clone(), 50);
        ingestor.ingest_entries(entries(&[200, 400])).await.unwrap();

        let empty = ingestor.ingest_entries(Vec::new()).await.unwrap();
        assert!(empty.is_nothing_new());
        assert_eq!(empty.phase, RunPhase::NoChange);

        let stale = ingestor.ingest_entries(entries(&[300, 400])).await.unwrap();
        assert!(stale.is_nothing_new());
        assert_eq!(stale.stats.appended, 0);
        assert_eq!(stale.stats.skipped_stale, 2);
        assert_eq!(stored_watermark(&store).await.as_deref(), Some("400-0"));
    }

    #[tokio::test]
    async fn test_malformed_row_dropped_rest_processed() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(store.clone(), 50);
        let row = |ts: &str, ids: &str| RawListing {
            heading: "E90 328i".to_string(),
            raw_timestamp: Some(ts.to_string()),
            image_ids: Some(ids.to_string()),
            ..RawListing::default()
        };

        let report = ingestor
            .ingest(vec![
                row("2022-09-22 22:01", "3:abc,3:def"),
                row("2022-09-22 22:05", "garbage"),
                row("2022-09-22 22:09", "3:ghi"),
            ])
            .await
            .unwrap();
        assert_eq!(report.stats.extracted, 3);
        assert_eq!(report.stats.malformed, 1);
        assert_eq!(report.malformed[0].field, "image_ids");
        assert_eq!(report.stats.appended, 2);

        let delta = report.outcome.entries();
        assert_eq!(delta[0].image_url, "https://img.example/abc.jpg");
        assert_eq!(delta[1].raw_timestamp, "2022-09-22 22:09");
    }

    #[tokio::test]
    async fn test_rerun_over_unchanged_source_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(store.clone(), 50);
        let batch = entries(&[100, 200, 300]);

        assert!(!ingestor.ingest_entries(batch.clone()).await.unwrap().is_nothing_new());
        let second = ingestor.ingest_entries(batch).await.unwrap();
        assert!(second.is_nothing_new());
        assert_eq!(store.len("stream:test").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_watermark_never_decreases() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(store.clone(), 50);
        let mut last = Watermark::INITIAL;

        let batches: [&[i64]; 6] = [&[500, 100], &[200, 300], &[600], &[50], &[], &[600, 700]];
        for batch in batches {
            let report = ingestor.ingest_entries(entries(batch)).await.unwrap();
            assert!(report.stats.new_watermark >= last);
            assert!(report
                .outcome
                .records()
                .iter()
                .all(|r| r.id > report.stats.previous_watermark.id()));
            last = report.stats.new_watermark;
        }
        assert_eq!(last.time_ordinal(), 700);
    }

    #[tokio::test]
    async fn test_log_growth_is_bounded() {
        let store = Arc::new(MemoryStore::with_trim_slack(3));
        let ingestor = ingestor(store.clone(), 5);

        for round in 0..10 {
            let base = 1000 * (round + 1);
            let batch: Vec<i64> = (0..4).map(|i| base + i).collect();
            ingestor.ingest_entries(entries(&batch)).await.unwrap();
            assert!(store.len("stream:test").await.unwrap() <= 5 + 3);
        }
    }

    #[tokio::test]
    async fn test_delta_survives_trimming_past_watermark() {
        let store = Arc::new(MemoryStore::with_trim_slack(0));
        let ingestor = ingestor(store.clone(), 2);
        ingestor.ingest_entries(entries(&[10])).await.unwrap();

        let report = ingestor
            .ingest_entries(entries(&[20, 30, 40, 50]))
            .await
            .unwrap();
        assert_eq!(delta_times(&report), vec![40, 50]);
        assert_eq!(report.stats.new_watermark.time_ordinal(), 50);
    }

    #[tokio::test]
    async fn test_store_failure_mid_batch_keeps_old_watermark() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(store.clone(), 50);
        ingestor.ingest_entries(entries(&[100])).await.unwrap();

        store.fail_after_appends(1);
        let err = ingestor
            .ingest_entries(entries(&[200, 300, 400]))
            .await
            .unwrap_err();
        assert!(err.is_store_failure());

        store.set_unavailable(false);
        store.fail_after_appends(usize::MAX);
        assert_eq!(stored_watermark(&store).await.as_deref(), Some("100-0"));
        // The appended prefix is visible
        assert_eq!(store.len("stream:test").await.unwrap(), 2);

        // The next run reports everything past the old watermark
        let report = ingestor.ingest_entries(entries(&[300, 400])).await.unwrap();
        assert_eq!(delta_times(&report), vec![200, 300, 400]);
        assert_eq!(stored_watermark(&store).await.as_deref(), Some("400-0"));
    }

    #[tokio::test]
    async fn test_every_run_ends_in_terminal_phase() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(store.clone(), 50);

        let first = ingestor.ingest_entries(entries(&[100])).await.unwrap();
        let again = ingestor.ingest_entries(entries(&[100])).await.unwrap();
        assert_eq!(first.phase, RunPhase::WatermarkSaved);
        assert_eq!(again.phase, RunPhase::NoChange);
        assert!(first.phase.is_terminal() && again.phase.is_terminal());
        assert!(!RunPhase::DeltaComputed.is_terminal());
        assert_eq!(RunPhase::DeltaComputed.to_string(), "delta computed");
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_run() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);
        let ingestor = ingestor(store.clone(), 50);
        let err = ingestor.ingest_entries(entries(&[1])).await.unwrap_err();
        assert!(err.is_store_failure());
    }
}
