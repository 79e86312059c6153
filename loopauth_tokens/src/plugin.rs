//! The extension point through which the token cache delegates persistence

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::{CacheContents, CacheStore, MergeFn};

/// Persistence hooks called by the token cache on every cache access
#[async_trait]
pub trait CachePlugin: Send + Sync {
    /// Reads the persisted cache
    ///
    /// An absent cache is a normal first-run state and is returned as empty contents.
    async fn read_from_storage(&self) -> Result<CacheContents, StoreError>;

    /// Persists the cache, merging with whatever is currently stored
    async fn write_to_storage(&self, merge: MergeFn) -> Result<(), StoreError>;
}

/// Bridges the [`CachePlugin`] contract onto a [`CacheStore`]
///
/// Contents pass through untouched.
#[derive(Debug)]
pub struct StorePlugin<S> {
    store: S,
}

impl<S> StorePlugin<S> {
    /// Wraps a store
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The wrapped store
    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S: CacheStore> CachePlugin for StorePlugin<S> {
    async fn read_from_storage(&self) -> Result<CacheContents, StoreError> {
        match self.store.load().await {
            Ok(contents) => Ok(contents),
            Err(err) if err.is_not_found() => {
                tracing::debug!("no persisted token cache, starting empty");
                Ok(CacheContents::empty())
            }
            Err(err) => Err(err),
        }
    }

    async fn write_to_storage(&self, merge: MergeFn) -> Result<(), StoreError> {
        self.store.save(merge).await
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::store::InMemoryCacheStore;

    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn load(&self) -> Result<CacheContents, StoreError> {
            Err(StoreError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "denied",
            )))
        }

        async fn save(&self, _: MergeFn) -> Result<(), StoreError> {
            Err(StoreError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "denied",
            )))
        }
    }

    #[tokio::test]
    async fn absent_cache_reads_as_empty() {
        let plugin = StorePlugin::new(InMemoryCacheStore::new());
        assert!(plugin.read_from_storage().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn contents_pass_through_untouched() {
        let blob = CacheContents::from(vec![0, 159, 146, 150, b'{']);
        let plugin = StorePlugin::new(InMemoryCacheStore::new());
        let to_write = blob.clone();
        plugin
            .write_to_storage(Box::new(move |_| to_write))
            .await
            .unwrap();

        assert_eq!(plugin.read_from_storage().await.unwrap(), blob);
    }

    #[tokio::test]
    async fn storage_failures_propagate() {
        let plugin = StorePlugin::new(BrokenStore);
        assert!(matches!(
            plugin.read_from_storage().await,
            Err(StoreError::Io(_))
        ));
        assert!(matches!(
            plugin
                .write_to_storage(Box::new(|_| CacheContents::empty()))
                .await,
            Err(StoreError::Io(_))
        ));
    }
}
