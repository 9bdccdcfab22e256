// src/models/record.rs

//! Log record identifiers, records and the watermark cursor.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Identifier of a record in the bounded log.
///
/// Ordered first by time ordinal, then by the store-assigned sequence number
/// that disambiguates records sharing the same second. Rendered as
/// `"<time>-<seq>"`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId {
    pub time: i64,
    pub seq: u64,
}

impl RecordId {
    /// The lowest possible id, used when no watermark has been stored yet.
    pub const ZERO: RecordId = RecordId { time: 0, seq: 0 };

    pub fn new(time: i64, seq: u64) -> Self {
        Self { time, seq }
    }

    /// The id that follows this one within the same second.
    pub fn next_in_second(self) -> Self {
        Self {
            time: self.time,
            seq: self.seq + 1,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.time, self.seq)
    }
}

impl FromStr for RecordId {
    type Err = AppError;

    /// Parses `"<time>-<seq>"`, or a bare time such as the `"0"` sentinel.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || AppError::validation(format!("invalid record id '{s}'"));

        let (time, seq) = match s.rsplit_once('-') {
            Some((time, seq)) if !time.is_empty() => (time, Some(seq)),
            _ => (s, None),
        };

        let time = time.parse::<i64>().map_err(|_| invalid())?;
        let seq = match seq {
            Some(seq) => seq.parse::<u64>().map_err(|_| invalid())?,
            None => 0,
        };
        Ok(Self { time, seq })
    }
}

impl TryFrom<String> for RecordId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.to_string()
    }
}

/// One persisted unit inside the bounded log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: RecordId,
    /// Flattened key/value payload, in insertion order
    pub fields: Vec<(String, String)>,
}

impl LogRecord {
    pub fn new(id: RecordId, fields: Vec<(String, String)>) -> Self {
        Self { id, fields }
    }

    /// Look up a payload field by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Cursor marking the most recently confirmed new log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark(RecordId);

impl Watermark {
    /// Watermark used on the first run, before anything has been emitted.
    pub const INITIAL: Watermark = Watermark(RecordId::ZERO);

    pub fn new(id: RecordId) -> Self {
        Self(id)
    }

    pub fn id(&self) -> RecordId {
        self.0
    }

    /// Numeric time portion, compared against entry timestamps.
    pub fn time_ordinal(&self) -> i64 {
        self.0.time
    }

    pub fn is_initial(&self) -> bool {
        self.0 == RecordId::ZERO
    }

    /// Whether an entry stamped at `epoch_seconds` is newer than this cursor.
    pub fn admits(&self, epoch_seconds: i64) -> bool {
        epoch_seconds > self.time_ordinal()
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_initial() {
            write!(f, "0")
        } else {
            write!(f, "{}", self.0)
        }
    }
}
