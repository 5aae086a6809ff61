//! Identification results memoized by image fingerprint.

use moka::sync::Cache;
use std::sync::Arc;

use crate::models::fingerprint::ContentHash;
use crate::models::medicine::IdentificationResult;

/// Bounded, write-once result cache.
///
/// The first `put` for a fingerprint wins; later puts return the stored
/// value unchanged. Eviction only drops memoized results, in-flight jobs are
/// tracked by the dispatcher and never depend on a cache entry.
#[derive(Clone)]
pub struct ResultCache {
    inner: Cache<ContentHash, Arc<IdentificationResult>>,
}

impl ResultCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder().max_capacity(max_capacity).build(),
        }
    }

    pub fn get(&self, fingerprint: &ContentHash) -> Option<Arc<IdentificationResult>> {
        self.inner.get(fingerprint)
    }

    /// Store `result` unless the fingerprint already has one, returning
    /// whichever value is now cached.
    pub fn put(
        &self,
        fingerprint: ContentHash,
        result: Arc<IdentificationResult>,
    ) -> Arc<IdentificationResult> {
        let entry = self.inner.entry(fingerprint).or_insert_with(|| result);
        if !entry.is_fresh() {
            tracing::debug!(fingerprint = %fingerprint.short(), "Result already cached, keeping first write");
        }
        entry.into_value()
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Apply pending evictions now instead of lazily.
    pub fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks();
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}
