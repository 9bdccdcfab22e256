// src/services/extract.rs

//! Listing row extraction from search result markup.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{ListingSelectors, RawListing};
use crate::utils::resolve_url;

use super::source::FetchedPage;

/// Extracts [`RawListing`] rows with selectors compiled once.
#[derive(Debug, Clone)]
pub struct ListingExtractor {
    row: Selector,
    heading: Selector,
    link: Selector,
    link_attr: String,
    image: Selector,
    image_attr: String,
    price: Selector,
    distance: Selector,
    date: Selector,
    date_attr: String,
}

impl ListingExtractor {
    pub fn new(selectors: &ListingSelectors) -> Result<Self> {
        Ok(Self {
            row: Self::parse_selector(&selectors.row_selector)?,
            heading: Self::parse_selector(&selectors.heading_selector)?,
            link: Self::parse_selector(&selectors.link_selector)?,
            link_attr: selectors.link_attr.clone(),
            image: Self::parse_selector(&selectors.image_selector)?,
            image_attr: selectors.image_attr.clone(),
            price: Self::parse_selector(&selectors.price_selector)?,
            distance: Self::parse_selector(&selectors.distance_selector)?,
            date: Self::parse_selector(&selectors.date_selector)?,
            date_attr: selectors.date_attr.clone(),
        })
    }

    /// Extract every row of a fetched page, resolving links against its URL.
    pub fn extract_page(&self, page: &FetchedPage) -> Result<Vec<RawListing>> {
        let base = Url::parse(&page.url)?;
        let document = Html::parse_document(&page.body);
        let rows: Vec<RawListing> = self.extract(&document, Some(&base)).collect();
        log::debug!("{} rows on {}", rows.len(), page.url);
        Ok(rows)
    }

    /// Lazily yield one raw listing per row in document order.
    pub fn extract<'a>(
        &'a self,
        document: &'a Html,
        base: Option<&'a Url>,
    ) -> impl Iterator<Item = RawListing> + 'a {
        document
            .select(&self.row)
            .map(move |row| self.parse_row(row, base))
    }

    fn parse_row(&self, row: ElementRef<'_>, base: Option<&Url>) -> RawListing {
        let link = Self::attr(row, &self.link, &self.link_attr)
            .map(|href| match base {
                Some(base) => resolve_url(base, &href),
                None => href,
            })
            .unwrap_or_default();

        RawListing {
            heading: Self::text(row, &self.heading),
            link,
            price: Self::text(row, &self.price),
            distance: Self::text(row, &self.distance),
            raw_timestamp: Self::attr(row, &self.date, &self.date_attr),
            image_ids: Self::attr(row, &self.image, &self.image_attr),
        }
    }

    /// Whitespace-collapsed text of the first match, empty when absent.
    fn text(row: ElementRef<'_>, selector: &Selector) -> String {
        row.select(selector)
            .next()
            .map(|el| {
                el.text()
                    .flat_map(str::split_whitespace)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default()
    }

    fn attr(row: ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
        row.select(selector)
            .next()
            .and_then(|el| el.value().attr(attr))
            .map(|value| value.trim().to_string())
    }

    fn parse_selector(s: &str) -> Result<Selector> {
        Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
    }
}
