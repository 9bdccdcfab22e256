//! Application configuration structures.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{ListingSelectors, ListingZone};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote search page and image CDN settings
    #[serde(default)]
    pub source: SourceConfig,

    /// HTTP client behavior
    #[serde(default)]
    pub http: HttpConfig,

    /// CSS selectors for listing extraction
    #[serde(default)]
    pub selectors: ListingSelectors,

    /// Bounded log and watermark settings
    #[serde(default)]
    pub stream: StreamConfig,

    /// Timestamp interpretation
    #[serde(default)]
    pub time: TimeConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(&path) {
            Ok(config) => {
                log::info!("Loaded configuration from {:?}", path.as_ref());
                config
            }
            Err(e) => {
                log::warn!(
                    "Config load failed from {:?}: {}. Using defaults.",
                    path.as_ref(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.source.search_url)?;
        if self.source.pages == 0 {
            return Err(AppError::validation("source.pages must be > 0"));
        }
        if self.source.image_base_url.trim().is_empty() {
            return Err(AppError::validation("source.image_base_url is empty"));
        }
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.http.max_concurrent == 0 {
            return Err(AppError::validation("http.max_concurrent must be > 0"));
        }
        if self.stream.stream_key.trim().is_empty() {
            return Err(AppError::validation("stream.stream_key is empty"));
        }
        if self.stream.watermark_key.trim().is_empty() {
            return Err(AppError::validation("stream.watermark_key is empty"));
        }
        if self.stream.stream_key == self.stream.watermark_key {
            return Err(AppError::validation(
                "stream.stream_key and stream.watermark_key must differ",
            ));
        }
        if self.stream.capacity == 0 {
            return Err(AppError::validation("stream.capacity must be > 0"));
        }
        if self.stream.store_timeout_ms == 0 {
            return Err(AppError::validation("stream.store_timeout_ms must be > 0"));
        }
        for (name, selector) in self.selectors.all() {
            Selector::parse(selector)
                .map_err(|e| AppError::selector(selector, format!("{name}: {e:?}")))?;
        }
        self.time.zone()?;
        Ok(())
    }
}

/// Remote search page settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Search results page, without query string
    #[serde(default = "defaults::search_url")]
    pub search_url: String,

    /// Search terms, filters and sort directives
    #[serde(default = "defaults::query")]
    pub query: BTreeMap<String, String>,

    /// Number of result pages to fetch
    #[serde(default = "defaults::pages")]
    pub pages: usize,

    /// Query parameter carrying the result offset
    #[serde(default = "defaults::page_offset_param")]
    pub page_offset_param: String,

    /// Number of results per page
    #[serde(default = "defaults::page_size")]
    pub page_size: usize,

    /// Image CDN prefix for cover images
    #[serde(default = "defaults::image_base_url")]
    pub image_base_url: String,

    /// Size suffix appended to the cover image id
    #[serde(default = "defaults::image_suffix")]
    pub image_suffix: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            search_url: defaults::search_url(),
            query: defaults::query(),
            pages: defaults::pages(),
            page_offset_param: defaults::page_offset_param(),
            page_size: defaults::page_size(),
            image_base_url: defaults::image_base_url(),
            image_suffix: defaults::image_suffix(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum concurrent page requests
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Bounded log and watermark settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Key of the bounded log
    #[serde(default = "defaults::stream_key")]
    pub stream_key: String,

    /// Key holding the last seen record id
    #[serde(default = "defaults::watermark_key")]
    pub watermark_key: String,

    /// Approximate number of records retained
    #[serde(default = "defaults::capacity")]
    pub capacity: usize,

    /// Records allowed above capacity before the store trims
    #[serde(default = "defaults::trim_slack")]
    pub trim_slack: usize,

    /// Upper bound on any single store call
    #[serde(default = "defaults::store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl StreamConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stream_key: defaults::stream_key(),
            watermark_key: defaults::watermark_key(),
            capacity: defaults::capacity(),
            trim_slack: defaults::trim_slack(),
            store_timeout_ms: defaults::store_timeout_ms(),
        }
    }
}

/// Timestamp interpretation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    /// `local`, `UTC`, a fixed offset like `+09:00`, or an IANA zone name
    #[serde(default = "defaults::zone")]
    pub zone: String,
}

impl TimeConfig {
    pub fn zone(&self) -> Result<ListingZone> {
        self.zone.parse()
    }
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            zone: defaults::zone(),
        }
    }
}

mod defaults {
    use std::collections::BTreeMap;

    // Source defaults
    pub fn search_url() -> String {
        "https://sacramento.craigslist.org/search/cta".into()
    }
    pub fn query() -> BTreeMap<String, String> {
        [
            ("query", "bmw"),
            ("purveyor", "owner"),
            ("sort", "date"),
            ("hasPic", "1"),
            ("bundleDuplicates", "1"),
            ("search_distance", "150"),
            ("postal", "95630"),
            ("min_price", "500"),
            ("max_price", "5000"),
            ("auto_transmission", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }
    pub fn pages() -> usize {
        1
    }
    pub fn page_offset_param() -> String {
        "s".into()
    }
    pub fn page_size() -> usize {
        120
    }
    pub fn image_base_url() -> String {
        "https://images.craigslist.org/".into()
    }
    pub fn image_suffix() -> String {
        "_600x450.jpg".into()
    }

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; listing-stream/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_concurrent() -> usize {
        2
    }

    // Stream defaults
    pub fn stream_key() -> String {
        "stream:craigslist".into()
    }
    pub fn watermark_key() -> String {
        "stream:craigslist:lastseen".into()
    }
    pub fn capacity() -> usize {
        50
    }
    pub fn trim_slack() -> usize {
        10
    }
    pub fn store_timeout_ms() -> u64 {
        5_000
    }

    // Time defaults
    pub fn zone() -> String {
        "local".into()
    }
}
