// src/services/source.rs

//! Search result page fetching.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Config, HttpConfig, SourceConfig};
use crate::utils::http::create_async_client;

/// Anything that can turn a URL into page markup.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch the raw markup at `url`.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// [`ListingSource`] over HTTP.
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
        })
    }
}

#[async_trait]
impl ListingSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::fetch(url, format!("HTTP {status}")));
        }
        Ok(response.text().await?)
    }
}

/// Search parameters plus pagination.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    base: Url,
    params: Vec<(String, String)>,
    pages: usize,
    offset_param: String,
    page_size: usize,
}

impl SearchQuery {
    pub fn from_config(source: &SourceConfig) -> Result<Self> {
        Ok(Self {
            base: Url::parse(&source.search_url)?,
            params: source
                .query
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            pages: source.pages,
            offset_param: source.page_offset_param.clone(),
            page_size: source.page_size,
        })
    }

    /// URL of every page to fetch. The first page carries no offset.
    pub fn page_urls(&self) -> Vec<Url> {
        (0..self.pages)
            .map(|page| {
                let mut url = self.base.clone();
                {
                    let mut pairs = url.query_pairs_mut();
                    pairs.extend_pairs(self.params.iter());
                    if page > 0 {
                        let offset = (page * self.page_size).to_string();
                        pairs.append_pair(&self.offset_param, &offset);
                    }
                }
                url
            })
            .collect()
    }
}

/// One fetched results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub body: String,
}

/// Fetches every configured page with bounded concurrency.
pub struct ListingFetcher<S> {
    source: S,
    query: SearchQuery,
    max_concurrent: usize,
}

impl ListingFetcher<HttpSource> {
    /// HTTP fetcher built from the full configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            HttpSource::new(&config.http)?,
            SearchQuery::from_config(&config.source)?,
            config.http.max_concurrent,
        ))
    }
}

impl<S: ListingSource> ListingFetcher<S> {
    pub fn new(source: S, query: SearchQuery, max_concurrent: usize) -> Self {
        Self {
            source,
            query,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    /// Fetch all pages, in page order. The first failure aborts.
    pub async fn fetch_all(&self) -> Result<Vec<FetchedPage>> {
        let urls = self.query.page_urls();
        log::info!(
            "Fetching {} page(s) from {} ({} concurrent)",
            urls.len(),
            self.query.base,
            self.max_concurrent
        );

        let pages: Vec<FetchedPage> = stream::iter(urls)
            .map(|url| async move {
                let body = self.source.fetch(url.as_str()).await.inspect_err(|e| {
                    log::error!("Failed to fetch {url}: {e}");
                })?;
                log::debug!("Fetched {} ({} bytes)", url, body.len());
                Ok::<_, AppError>(FetchedPage {
                    url: url.to_string(),
                    body,
                })
            })
            .buffered(self.max_concurrent)
            .try_collect()
            .await?;

        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned bodies and records requested URLs.
    #[derive(Default)]
    struct StubSource {
        pages: HashMap<String, String>,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ListingSource for StubSource {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.requested.lock().unwrap().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| AppError::fetch(url, "HTTP 404 Not Found"))
        }
    }

    fn source_config(pages: usize) -> SourceConfig {
        SourceConfig {
            search_url: "https://example.org/search/cta".to_string(),
            query: [("query", "bmw"), ("sort", "date")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            pages,
            page_size: 120,
            ..SourceConfig::default()
        }
    }

    #[test]
    fn test_page_urls_carry_offsets() {
        let query = SearchQuery::from_config(&source_config(3)).unwrap();
        let urls: Vec<String> = query.page_urls().iter().map(Url::to_string).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.org/search/cta?query=bmw&sort=date",
                "https://example.org/search/cta?query=bmw&sort=date&s=120",
                "https://example.org/search/cta?query=bmw&sort=date&s=240",
            ]
        );
    }

    #[test]
    fn test_invalid_search_url() {
        let mut config = source_config(1);
        config.search_url = "not a url".to_string();
        assert!(matches!(
            SearchQuery::from_config(&config),
            Err(AppError::Url(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_all_preserves_page_order() {
        let query = SearchQuery::from_config(&source_config(2)).unwrap();
        let urls = query.page_urls();
        let source = StubSource {
            pages: urls
                .iter()
                .enumerate()
                .map(|(i, u)| (u.to_string(), format!("page {i}")))
                .collect(),
            ..StubSource::default()
        };

        let fetcher = ListingFetcher::new(source, query, 4);
        let pages = fetcher.fetch_all().await.unwrap();
        let bodies: Vec<&str> = pages.iter().map(|p| p.body.as_str()).collect();
        assert_eq!(bodies, vec!["page 0", "page 1"]);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts() {
        let query = SearchQuery::from_config(&source_config(1)).unwrap();
        let fetcher = ListingFetcher::new(StubSource::default(), query, 1);
        let err = fetcher.fetch_all().await.unwrap_err();
        assert!(err.is_fetch_failure());
    }
}
