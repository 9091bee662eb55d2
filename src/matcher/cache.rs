//! Bounded candidate lookup cache.
//!
//! Key-based fetches dominate a matching run (every synonym resolution and
//! parent walk goes through `get`), so a bounded cache sits in front of the
//! store. Concurrent lookups of the same key block on a single load; the
//! loader runs at most once per key.

use std::sync::Arc;

use moka::sync::Cache;

use crate::classification::Classification;
use crate::error::StoreError;
use crate::matcher::boundary::{Candidate, Searcher};

/// Default cache capacity, in entries.
pub const DEFAULT_CACHE_CAPACITY: u64 = 100_000;

/// A [`Searcher`] decorator caching `get` lookups.
///
/// Searches are never cached; their result sets depend on the whole query
/// and are consumed immediately.
pub struct CachedSearcher<S, C> {
    inner: S,
    cache: Cache<String, Option<Arc<C>>>,
}

impl<S, C> CachedSearcher<S, C>
where
    C: Candidate + 'static,
    S: Searcher<C>,
{
    /// Wrap a searcher with the default capacity.
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self::with_capacity(inner, DEFAULT_CACHE_CAPACITY)
    }

    /// Wrap a searcher with an explicit entry capacity.
    #[must_use]
    pub fn with_capacity(inner: S, capacity: u64) -> Self {
        Self {
            inner,
            cache: Cache::new(capacity),
        }
    }

    /// The wrapped searcher.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of cached entries.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl<S, C> Searcher<C> for CachedSearcher<S, C>
where
    C: Candidate + 'static,
    S: Searcher<C>,
{
    fn search(&self, query: &Classification) -> Result<Vec<Arc<C>>, StoreError> {
        self.inner.search(query)
    }

    fn get(&self, key: &str) -> Result<Option<Arc<C>>, StoreError> {
        self.cache
            .try_get_with(key.to_string(), || self.inner.get(key))
            .map_err(|e: Arc<StoreError>| StoreError::Backend {
                message: e.to_string(),
            })
    }
}
