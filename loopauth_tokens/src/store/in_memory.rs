//! An in-memory token cache store

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CacheContents, CacheStore, MergeFn};
use crate::error::StoreError;

/// A store that keeps the serialized cache in memory
///
/// Contents do not survive the process. Useful for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    contents: Mutex<Option<CacheContents>>,
}

impl InMemoryCacheStore {
    /// Constructs a new, empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs a store that already holds `contents`
    pub fn with_contents(contents: CacheContents) -> Self {
        Self {
            contents: Mutex::new(Some(contents)),
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn load(&self) -> Result<CacheContents, StoreError> {
        self.contents.lock().await.clone().ok_or(StoreError::NotFound)
    }

    async fn save(&self, merge: MergeFn) -> Result<(), StoreError> {
        let mut guard = self.contents.lock().await;
        let merged = merge(guard.take());
        *guard = Some(merged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_store_reports_not_found() {
        let store = InMemoryCacheStore::new();
        assert!(matches!(store.load().await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn merge_sees_previous_contents() {
        let store = InMemoryCacheStore::with_contents(CacheContents::from(b"one".to_vec()));
        store
            .save(Box::new(|old| {
                let mut bytes = old.map(CacheContents::into_bytes).unwrap_or_default();
                bytes.extend_from_slice(b"+two");
                CacheContents::from(bytes)
            }))
            .await
            .unwrap();

        assert_eq!(store.load().await.unwrap().as_bytes(), b"one+two");
    }
}
