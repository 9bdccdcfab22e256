// src/models/mod.rs

//! Domain models for the listing stream.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod entry;
mod record;
mod selectors;
mod zone;

// Re-export all public types
pub use config::{Config, HttpConfig, SourceConfig, StreamConfig, TimeConfig};
pub use entry::{Entry, RawListing, fields};
pub use record::{LogRecord, RecordId, Watermark};
pub use selectors::ListingSelectors;
pub use zone::ListingZone;
