//! Read-through DEK cache (§10.3): the unwrap in [`crate::dek::DekManager`]
//! is a KMS-free AEAD call, cheap on its own, but secrets/transit/
//! tokenization reads can hit the same DEK thousands of times a second, so
//! a bounded TTL cache sits in front of it keyed by DEK id.

use crate::dek::DekManager;
use crate::error::CoreResult;
use crate::kek::KekChain;
use crate::model::Dek;
use moka::future::Cache;
use std::time::Duration;
use zeroize::Zeroizing;

/// Caches a DEK's unwrapped material, keyed by DEK id. Values are wrapped
/// in `Zeroizing` so an evicted entry's backing allocation is cleared
/// rather than left as cold plaintext on the heap.
#[derive(Clone)]
pub struct DekCache {
    inner: Cache<uuid::Uuid, Zeroizing<[u8; 32]>>,
}

impl DekCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let inner = Cache::builder().max_capacity(capacity).time_to_live(ttl).build();
        Self { inner }
    }

    /// Returns the unwrapped material for `dek`, unwrapping and caching it
    /// on a miss.
    pub async fn unwrap(&self, kek_chain: &KekChain, dek: &Dek) -> CoreResult<[u8; 32]> {
        if let Some(material) = self.inner.get(&dek.id).await {
            return Ok(*material);
        }
        let material = DekManager::unwrap(kek_chain, dek)?;
        self.inner.insert(dek.id, Zeroizing::new(material)).await;
        Ok(material)
    }

    /// Drops a DEK from the cache; called after `rewrap_batch` moves it so
    /// a stale entry can't outlive the rewrap under a retained TTL.
    pub async fn invalidate(&self, dek_id: uuid::Uuid) {
        self.inner.invalidate(&dek_id).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}
