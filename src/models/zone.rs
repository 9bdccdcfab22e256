//! Time zone used to interpret scraped wall-clock timestamps.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::AppError;

/// Zone in which listing timestamps are interpreted.
///
/// `Local` follows the host machine and is what historical watermarks were
/// produced with; the other variants pin the result regardless of where the
/// job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListingZone {
    #[default]
    Local,
    Utc,
    Fixed(FixedOffset),
    Named(Tz),
}

impl ListingZone {
    /// Convert a wall-clock time in this zone into Unix seconds.
    ///
    /// Ambiguous times (clocks turned back) resolve to the earlier instant.
    /// Times inside a forward gap are shifted forward by one hour.
    pub fn epoch_seconds(&self, naive: NaiveDateTime) -> Option<i64> {
        match self {
            Self::Local => resolve(&Local, naive),
            Self::Utc => resolve(&Utc, naive),
            Self::Fixed(offset) => resolve(offset, naive),
            Self::Named(tz) => resolve(tz, naive),
        }
    }
}

fn resolve<Z: TimeZone>(zone: &Z, naive: NaiveDateTime) -> Option<i64> {
    zone.from_local_datetime(&naive)
        .earliest()
        .or_else(|| zone.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.timestamp())
}

impl FromStr for ListingZone {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "local" => return Ok(Self::Local),
            "utc" | "z" => return Ok(Self::Utc),
            _ => {}
        }

        if s.starts_with('+') || s.starts_with('-') {
            return parse_offset(s)
                .map(Self::Fixed)
                .ok_or_else(|| AppError::config(format!("invalid UTC offset '{s}'")));
        }

        s.parse::<Tz>()
            .map(Self::Named)
            .map_err(|e| AppError::config(format!("unknown time zone '{s}': {e}")))
    }
}

/// Parse `+HH:MM`, `+HHMM` or `+HH` (and the `-` forms).
fn parse_offset(s: &str) -> Option<FixedOffset> {
    let (sign, digits) = match s.split_at(1) {
        ("+", rest) => (1, rest),
        ("-", rest) => (-1, rest),
        _ => return None,
    };
    let digits: String = digits.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl fmt::Display for ListingZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Utc => write!(f, "UTC"),
            Self::Fixed(offset) => write!(f, "{offset}"),
            Self::Named(tz) => write!(f, "{}", tz.name()),
        }
    }
}
