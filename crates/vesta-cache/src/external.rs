//! The external shared cache: a caller-provided side-channel keyed by
//! sandbox name. Identical keys always carry identical bytes by
//! construction, so last-writer-wins is safe.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

use crate::cache::CacheEntry;

/// What an external cache returns on a hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalEntry {
    pub bytes: Vec<u8>,
    pub references: BTreeSet<String>,
}

/// Synchronous external cache. Implementations must be safe for concurrent
/// readers and writers; failures should degrade to misses, not errors.
pub trait ExternalCache: Send + Sync {
    fn load(&self, name: &str) -> Option<ExternalEntry>;
    fn store(&self, entry: &CacheEntry);
}

/// Future-returning flavor, for caches backed by remote stores.
pub trait AsyncExternalCache: Send + Sync {
    fn load<'a>(
        &'a self,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<ExternalEntry>> + Send + 'a>>;

    fn store<'a>(
        &'a self,
        entry: &'a CacheEntry,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Adapts an [`AsyncExternalCache`] to the synchronous interface the loader
/// expects; the loader blocks until the future resolves.
pub struct BlockingExternalCache<C> {
    runtime: tokio::runtime::Runtime,
    inner: C,
}

impl<C: AsyncExternalCache> BlockingExternalCache<C> {
    /// A single-thread runtime is enough here: each call drives exactly one
    /// future to completion, and rewrites happen on the requesting thread.
    pub fn new(inner: C) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { runtime, inner })
    }
}

impl<C: AsyncExternalCache> ExternalCache for BlockingExternalCache<C> {
    fn load(&self, name: &str) -> Option<ExternalEntry> {
        self.runtime.block_on(self.inner.load(name))
    }

    fn store(&self, entry: &CacheEntry) {
        self.runtime.block_on(self.inner.store(entry));
    }
}
