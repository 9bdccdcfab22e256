//! Delta resolution against the persisted watermark.
//!
//! Compares the log tail with the watermark loaded at the start of the run
//! and, when the log moved, reads every record past the old cursor and
//! advances the watermark to the tail.

use std::time::Duration;

use serde::Serialize;

use crate::error::Result;
use crate::models::{Entry, LogRecord, Watermark};
use crate::storage::{ListingStore, bounded};

use super::watermark::WatermarkClient;

/// Result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "records", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The log tail did not move past the watermark
    NothingNew,
    /// Records newer than the previous watermark, oldest first
    Delta(Vec<LogRecord>),
}

impl RunOutcome {
    pub fn is_nothing_new(&self) -> bool {
        matches!(self, Self::NothingNew)
    }

    pub fn records(&self) -> &[LogRecord] {
        match self {
            Self::NothingNew => &[],
            Self::Delta(records) => records,
        }
    }

    /// The delta as entries, in log order.
    pub fn entries(&self) -> Vec<Entry> {
        self.records().iter().map(Entry::from_record).collect()
    }
}

/// Resolved delta plus the watermark the run ends with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub outcome: RunOutcome,
    pub watermark: Watermark,
}

/// Computes the delta for one run and persists the advanced watermark.
pub struct DeltaResolver<'a> {
    store: &'a dyn ListingStore,
    stream_key: &'a str,
    watermarks: &'a WatermarkClient<'a>,
    timeout: Duration,
}

impl<'a> DeltaResolver<'a> {
    pub fn new(
        store: &'a dyn ListingStore,
        stream_key: &'a str,
        watermarks: &'a WatermarkClient<'a>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            stream_key,
            watermarks,
            timeout,
        }
    }

    /// Compare the log tail with `previous`, the watermark loaded at the
    /// start of this run, and read the records past it. Nothing is written.
    pub async fn compute(&self, previous: Watermark) -> Result<Resolution> {
        let unchanged = Resolution {
            outcome: RunOutcome::NothingNew,
            watermark: previous,
        };

        let tail = bounded(self.timeout, "tail read", self.store.tail(self.stream_key, 1)).await?;
        let Some(top) = tail.first().map(|record| record.id) else {
            log::info!("Log '{}' is empty, nothing new", self.stream_key);
            return Ok(unchanged);
        };

        if top == previous.id() {
            log::info!("Log tail {} matches watermark, nothing new", top);
            return Ok(unchanged);
        }
        if top < previous.id() {
            log::warn!(
                "Log tail {} is behind watermark {}; leaving watermark in place",
                top,
                previous
            );
            return Ok(unchanged);
        }

        let records = bounded(
            self.timeout,
            "range read",
            self.store.range_after(self.stream_key, previous.id()),
        )
        .await?;
        log::info!("{} new records since {}", records.len(), previous);

        Ok(Resolution {
            outcome: RunOutcome::Delta(records),
            watermark: Watermark::new(top),
        })
    }

    /// Persist the advanced watermark of a delta. A "nothing new"
    /// resolution leaves the stored watermark alone.
    pub async fn commit(&self, resolution: &Resolution) -> Result<()> {
        if let RunOutcome::Delta(_) = resolution.outcome {
            self.watermarks.save(resolution.watermark.id()).await?;
        }
        Ok(())
    }
}
