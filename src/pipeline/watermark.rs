//! Watermark store client.
//!
//! The only component that reads or writes the persisted cursor.

use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::{RecordId, Watermark};
use crate::storage::{ListingStore, bounded};

/// Reads and writes the last seen record id under a well-known key.
pub struct WatermarkClient<'a> {
    store: &'a dyn ListingStore,
    key: &'a str,
    timeout: Duration,
}

impl<'a> WatermarkClient<'a> {
    pub fn new(store: &'a dyn ListingStore, key: &'a str, timeout: Duration) -> Self {
        Self {
            store,
            key,
            timeout,
        }
    }

    /// Load the persisted watermark, or [`Watermark::INITIAL`] if none exists.
    ///
    /// A value that does not parse as a record id is rejected rather than
    /// reset, since resetting would re-emit the whole log.
    pub async fn load(&self) -> Result<Watermark> {
        let stored = bounded(self.timeout, "watermark load", self.store.get(self.key)).await?;
        match stored {
            None => {
                log::info!("No watermark at '{}', starting from 0", self.key);
                Ok(Watermark::INITIAL)
            }
            Some(value) => {
                let id: RecordId = value.parse().map_err(|_| {
                    AppError::validation(format!(
                        "stored watermark '{}' under '{}' is not a record id",
                        value, self.key
                    ))
                })?;
                Ok(Watermark::new(id))
            }
        }
    }

    /// Overwrite the persisted watermark.
    pub async fn save(&self, id: RecordId) -> Result<()> {
        bounded(
            self.timeout,
            "watermark save",
            self.store.set(self.key, &id.to_string()),
        )
        .await?;
        log::info!("Watermark '{}' set to {}", self.key, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    const KEY: &str = "stream:test:lastseen";

    fn timeout() -> Duration {
        Duration::from_secs(1)
    }

    #[tokio::test]
    async fn test_missing_watermark_is_initial() {
        let store = MemoryStore::new();
        let client = WatermarkClient::new(&store, KEY, timeout());
        assert_eq!(client.load().await.unwrap(), Watermark::INITIAL);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemoryStore::new();
        let client = WatermarkClient::new(&store, KEY, timeout());
        client.save(RecordId::new(400, 1)).await.unwrap();
        assert_eq!(
            client.load().await.unwrap(),
            Watermark::new(RecordId::new(400, 1))
        );
        assert_eq!(store.get(KEY).await.unwrap().as_deref(), Some("400-1"));
    }

    #[tokio::test]
    async fn test_legacy_sentinel_value() {
        let store = MemoryStore::new();
        store.set(KEY, "0").await.unwrap();
        let client = WatermarkClient::new(&store, KEY, timeout());
        assert!(client.load().await.unwrap().is_initial());
    }

    #[tokio::test]
    async fn test_corrupt_watermark_rejected() {
        let store = MemoryStore::new();
        store.set(KEY, "yesterday").await.unwrap();
        let client = WatermarkClient::new(&store, KEY, timeout());
        assert!(matches!(
            client.load().await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_store() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let client = WatermarkClient::new(&store, KEY, timeout());
        assert!(client.load().await.unwrap_err().is_store_failure());
        assert!(client.save(RecordId::new(1, 0)).await.unwrap_err().is_store_failure());
    }
}
