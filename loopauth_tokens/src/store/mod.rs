//! Durable storage for the serialized token cache
//!
//! A store treats the cache as an opaque byte sequence. It never parses the
//! contents; the token cache owns the schema.

use std::fmt;

use async_trait::async_trait;

use crate::error::StoreError;

#[cfg(feature = "file")]
pub mod file;
pub mod in_memory;

#[cfg(feature = "file")]
pub use file::FileCacheStore;
pub use in_memory::InMemoryCacheStore;

/// The opaque serialized token cache
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CacheContents(Vec<u8>);

impl CacheContents {
    /// Wraps raw bytes
    #[inline]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// An empty cache, the first-run value handed to the token cache
    #[inline]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Whether there are no bytes at all
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the value, returning the raw bytes
    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for CacheContents {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for CacheContents {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Contents carry refresh tokens
        write!(f, "CacheContents({} bytes)", self.0.len())
    }
}

/// Computes the contents to persist from the currently persisted contents
///
/// Receives `None` when nothing has been persisted yet.
pub type MergeFn = Box<dyn FnOnce(Option<CacheContents>) -> CacheContents + Send>;

/// Durable key-value persistence for the serialized token cache
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Reads the full current contents
    ///
    /// Returns [`StoreError::NotFound`] if nothing has been persisted yet.
    async fn load(&self) -> Result<CacheContents, StoreError>;

    /// Replaces the persisted contents with the result of `merge`
    ///
    /// `merge` receives the current contents, or `None` if there are none. The
    /// write fully replaces the prior contents and never interleaves with
    /// another save made through the same store.
    async fn save(&self, merge: MergeFn) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: CacheStore + ?Sized> CacheStore for std::sync::Arc<S> {
    async fn load(&self) -> Result<CacheContents, StoreError> {
        (**self).load().await
    }

    async fn save(&self, merge: MergeFn) -> Result<(), StoreError> {
        (**self).save(merge).await
    }
}
