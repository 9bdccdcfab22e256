//! Listing data structures.

use serde::{Deserialize, Serialize};

use crate::models::LogRecord;

/// Payload field names written to the log.
pub mod fields {
    pub const HEADING: &str = "heading";
    pub const LINK: &str = "link";
    pub const PRICE: &str = "price";
    pub const DISTANCE: &str = "distance";
    pub const DATE_TIME: &str = "dateTime";
    pub const IMAGE: &str = "image";
}

/// A listing row as scraped from the results page, before normalization.
///
/// Display fields default to empty strings when the markup lacks them; the
/// timestamp and image ids are required downstream and stay optional here so
/// the normalizer can reject them explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListing {
    pub heading: String,
    pub link: String,
    pub price: String,
    pub distance: String,
    /// Source formatted date, canonical form `YYYY-MM-DD HH:MM`
    pub raw_timestamp: Option<String>,
    /// Opaque image id list, e.g. `3:00a0a_hash,3:00b0b_hash`
    pub image_ids: Option<String>,
}

/// One normalized listing observed in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Display title
    pub heading: String,

    /// Canonical URL of the listing (payload only, not identity)
    pub link: String,

    /// Display formatted price
    pub price: String,

    /// Display formatted proximity indicator
    pub distance: String,

    /// Source formatted date/time string
    pub raw_timestamp: String,

    /// Unix timestamp derived from `raw_timestamp`
    pub epoch_seconds: i64,

    /// Fully qualified cover image URL
    pub image_url: String,
}

impl Entry {
    /// Flatten into the key/value payload stored in the log.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            (fields::HEADING.to_string(), self.heading.clone()),
            (fields::LINK.to_string(), self.link.clone()),
            (fields::PRICE.to_string(), self.price.clone()),
            (fields::DISTANCE.to_string(), self.distance.clone()),
            (fields::DATE_TIME.to_string(), self.raw_timestamp.clone()),
            (fields::IMAGE.to_string(), self.image_url.clone()),
        ]
    }

    /// Rebuild an entry from a log record, taking the timestamp from its id.
    pub fn from_record(record: &LogRecord) -> Self {
        let get = |name: &str| record.field(name).unwrap_or_default().to_string();
        Self {
            heading: get(fields::HEADING),
            link: get(fields::LINK),
            price: get(fields::PRICE),
            distance: get(fields::DISTANCE),
            raw_timestamp: get(fields::DATE_TIME),
            epoch_seconds: record.id.time,
            image_url: get(fields::IMAGE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordId;

    fn sample_entry() -> Entry {
        Entry {
            heading: "2004 BMW 330ci".to_string(),
            link: "https://sacramento.craigslist.org/cto/d/330ci/7535.html".to_string(),
            price: "$4,500".to_string(),
            distance: "12.3mi".to_string(),
            raw_timestamp: "2022-09-22 22:01".to_string(),
            epoch_seconds: 1663909260,
            image_url: "https://images.craigslist.org/00x0x_abc_600x450.jpg".to_string(),
        }
    }

    #[test]
    fn test_to_fields_order() {
        let keys: Vec<String> = sample_entry().to_fields().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec!["heading", "link", "price", "distance", "dateTime", "image"]
        );
    }

    #[test]
    fn test_from_record_restores_entry() {
        let entry = sample_entry();
        let record = LogRecord::new(RecordId::new(entry.epoch_seconds, 0), entry.to_fields());
        assert_eq!(Entry::from_record(&record), entry);
    }
}
