// src/error.rs

//! Unified error handling for the listing stream.

use std::fmt;

use thiserror::Error;

use crate::models::RecordId;

/// Result type alias for listing stream operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// A single scraped record that could not be normalized.
///
/// Malformed records are dropped from the batch and reported; they never
/// abort a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed {field} '{value}': {reason}")]
pub struct MalformedEntry {
    /// Name of the offending raw field
    pub field: &'static str,
    /// The raw value as scraped
    pub value: String,
    /// Why the value was rejected
    pub reason: String,
}

impl MalformedEntry {
    pub fn new(field: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// The listings page could not be fetched
    #[error("Fetch error for {url}: {message}")]
    Fetch { url: String, message: String },

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A scraped record could not be normalized
    #[error("Malformed entry: {0}")]
    Malformed(#[from] MalformedEntry),

    /// The store is unreachable, failed, or timed out
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store refused an append older than the newest record
    #[error("Append at {requested} is older than log top {top}")]
    OutOfOrder { requested: i64, top: RecordId },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization failed
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a fetch error for a URL.
    pub fn fetch(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a store unavailability error.
    pub fn store_unavailable(message: impl fmt::Display) -> Self {
        Self::StoreUnavailable(message.to_string())
    }

    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether this error came from fetching the listings page.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::Http(_))
    }

    /// Whether this error came from the persistence layer.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}
