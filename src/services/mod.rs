//! Collaborators that feed the pipeline.
//!
//! - Page fetching (`ListingSource`, `HttpSource`, `ListingFetcher`)
//! - Search pagination (`SearchQuery`)
//! - Row extraction (`ListingExtractor`)

mod extract;
mod source;

pub use extract::ListingExtractor;
pub use source::{FetchedPage, HttpSource, ListingFetcher, ListingSource, SearchQuery};
