// src/pipeline/normalize.rs

//! Entry normalization.
//!
//! Turns scraped [`RawListing`] rows into canonical [`Entry`] values with a
//! derived Unix timestamp and a fully qualified cover image URL.

use chrono::{Duration, NaiveDate};
use regex::Regex;

use crate::error::{AppError, MalformedEntry, Result};
use crate::models::{Config, Entry, ListingZone, RawListing};

/// `YYYY-MM-DD HH:MM`, single space between date and time. Trailing seconds
/// are accepted and ignored.
const TIMESTAMP_PATTERN: &str =
    r"^(\d{4})-(\d{1,2})-(\d{1,2}) (\d{1,2}):(\d{1,2})(?::\d{1,2})?$";

/// Normalizer for scraped listing rows.
#[derive(Debug, Clone)]
pub struct Normalizer {
    zone: ListingZone,
    image_base_url: String,
    image_suffix: String,
    timestamp_pattern: Regex,
}

impl Normalizer {
    pub fn new(
        zone: ListingZone,
        image_base_url: impl Into<String>,
        image_suffix: impl Into<String>,
    ) -> Result<Self> {
        let timestamp_pattern = Regex::new(TIMESTAMP_PATTERN)
            .map_err(|e| AppError::config(format!("timestamp pattern: {e}")))?;
        Ok(Self {
            zone,
            image_base_url: image_base_url.into(),
            image_suffix: image_suffix.into(),
            timestamp_pattern,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.time.zone()?,
            &config.source.image_base_url,
            &config.source.image_suffix,
        )
    }

    pub fn zone(&self) -> ListingZone {
        self.zone
    }

    /// Normalize one scraped row.
    pub fn normalize(&self, raw: &RawListing) -> std::result::Result<Entry, MalformedEntry> {
        let raw_timestamp = raw
            .raw_timestamp
            .as_deref()
            .ok_or_else(|| MalformedEntry::new("raw_timestamp", "", "missing"))?;
        let image_ids = raw
            .image_ids
            .as_deref()
            .ok_or_else(|| MalformedEntry::new("image_ids", "", "missing"))?;

        let epoch_seconds = self.epoch_seconds(raw_timestamp)?;
        let image_url = self.cover_image_url(image_ids)?;

        Ok(Entry {
            heading: raw.heading.clone(),
            link: raw.link.clone(),
            price: raw.price.clone(),
            distance: raw.distance.clone(),
            raw_timestamp: raw_timestamp.trim().to_string(),
            epoch_seconds,
            image_url,
        })
    }

    /// Normalize a sequence of rows, separating malformed ones.
    pub fn normalize_all<I>(&self, raws: I) -> (Vec<Entry>, Vec<MalformedEntry>)
    where
        I: IntoIterator<Item = RawListing>,
    {
        let mut entries = Vec::new();
        let mut malformed = Vec::new();
        for raw in raws {
            match self.normalize(&raw) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    log::warn!("Dropping listing '{}': {}", raw.heading, err);
                    malformed.push(err);
                }
            }
        }
        (entries, malformed)
    }

    /// Parse a `YYYY-MM-DD HH:MM` wall-clock timestamp into Unix seconds.
    ///
    /// Components past their range roll over into the next unit, so
    /// `2022-02-30 10:00` is `2022-03-02 10:00` and hour 24 is midnight of
    /// the following day. Only a pattern mismatch is malformed.
    pub fn epoch_seconds(&self, raw: &str) -> std::result::Result<i64, MalformedEntry> {
        let malformed = |reason: &str| MalformedEntry::new("raw_timestamp", raw, reason);
        let caps = self
            .timestamp_pattern
            .captures(raw.trim())
            .ok_or_else(|| malformed("expected 'YYYY-MM-DD HH:MM'"))?;

        let number = |i: usize| caps[i].parse::<i64>().map_err(|_| malformed("not a number"));
        let (year, month, day) = (number(1)?, number(2)?, number(3)?);
        let (hour, minute) = (number(4)?, number(5)?);

        let unrepresentable = || malformed("not representable as a date");
        let months = year * 12 + month - 1;
        let first_of_month = NaiveDate::from_ymd_opt(
            i32::try_from(months.div_euclid(12)).map_err(|_| unrepresentable())?,
            u32::try_from(months.rem_euclid(12) + 1).map_err(|_| unrepresentable())?,
            1,
        )
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(unrepresentable)?;

        let offset = Duration::days(day - 1) + Duration::hours(hour) + Duration::minutes(minute);
        let naive = first_of_month
            .checked_add_signed(offset)
            .ok_or_else(unrepresentable)?;

        self.zone
            .epoch_seconds(naive)
            .ok_or_else(|| malformed("not representable in the configured time zone"))
    }

    /// Build the cover image URL from an image id list such as
    /// `3:00a0a_hash,3:00b0b_hash`.
    ///
    /// The cover id is the text between the first `:` and the first `,`; a
    /// list with a single image has no `,` and runs to the end.
    pub fn cover_image_url(&self, image_ids: &str) -> std::result::Result<String, MalformedEntry> {
        let malformed = |reason: &str| MalformedEntry::new("image_ids", image_ids, reason);

        let colon = image_ids
            .find(':')
            .ok_or_else(|| malformed("no ':' delimiter"))?;
        let end = match image_ids.find(',') {
            Some(comma) if comma < colon => return Err(malformed("',' before first ':'")),
            Some(comma) => comma,
            None => image_ids.len(),
        };

        let cover_id = image_ids[colon + 1..end].trim();
        if cover_id.is_empty() {
            return Err(malformed("empty cover image id"));
        }
        Ok(format!(
            "{}{}{}",
            self.image_base_url, cover_id, self.image_suffix
        ))
    }
}
