// src/models/selectors.rs

//! CSS selectors for scraping a listings results page.

use serde::{Deserialize, Serialize};

/// CSS selectors and attribute names for scraping listing rows.
///
/// Every selector except `row_selector` is evaluated relative to a row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingSelectors {
    /// Selector for each result row
    #[serde(default = "defaults::row")]
    pub row_selector: String,

    /// Selector for the heading element
    #[serde(default = "defaults::heading")]
    pub heading_selector: String,

    /// Selector for the element carrying the listing link
    #[serde(default = "defaults::heading")]
    pub link_selector: String,

    /// HTML attribute holding the link (usually "href")
    #[serde(default = "defaults::link_attr")]
    pub link_attr: String,

    /// Selector for the element carrying the image id list
    #[serde(default = "defaults::image")]
    pub image_selector: String,

    /// HTML attribute holding the image id list
    #[serde(default = "defaults::image_attr")]
    pub image_attr: String,

    /// Selector for the price element
    #[serde(default = "defaults::price")]
    pub price_selector: String,

    /// Selector for the distance element
    #[serde(default = "defaults::distance")]
    pub distance_selector: String,

    /// Selector for the posting date element
    #[serde(default = "defaults::date")]
    pub date_selector: String,

    /// HTML attribute holding the `YYYY-MM-DD HH:MM` timestamp
    #[serde(default = "defaults::date_attr")]
    pub date_attr: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            row_selector: defaults::row(),
            heading_selector: defaults::heading(),
            link_selector: defaults::heading(),
            link_attr: defaults::link_attr(),
            image_selector: defaults::image(),
            image_attr: defaults::image_attr(),
            price_selector: defaults::price(),
            distance_selector: defaults::distance(),
            date_selector: defaults::date(),
            date_attr: defaults::date_attr(),
        }
    }
}

impl ListingSelectors {
    /// All selector strings paired with their config names.
    pub fn all(&self) -> [(&'static str, &str); 7] {
        [
            ("row_selector", self.row_selector.as_str()),
            ("heading_selector", self.heading_selector.as_str()),
            ("link_selector", self.link_selector.as_str()),
            ("image_selector", self.image_selector.as_str()),
            ("price_selector", self.price_selector.as_str()),
            ("distance_selector", self.distance_selector.as_str()),
            ("date_selector", self.date_selector.as_str()),
        ]
    }
}

mod defaults {
    pub fn row() -> String {
        "li.result-row".into()
    }
    pub fn heading() -> String {
        ".result-heading > a".into()
    }
    pub fn link_attr() -> String {
        "href".into()
    }
    pub fn image() -> String {
        ".result-image[data-ids]".into()
    }
    pub fn image_attr() -> String {
        "data-ids".into()
    }
    pub fn price() -> String {
        ".result-meta .result-price".into()
    }
    pub fn distance() -> String {
        ".maptag".into()
    }
    pub fn date() -> String {
        ".result-date".into()
    }
    pub fn date_attr() -> String {
        "datetime".into()
    }
}
