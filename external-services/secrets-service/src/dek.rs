//! Data Encryption Keys (§4.5): generated per payload, wrapped under
//! whichever KEK is active at creation time, and re-wrapped in bulk when a
//! KEK rotates out from under them (§4.10).

use crate::envelope;
use crate::error::CoreResult;
use crate::kek::KekChain;
use crate::model::Dek;
use async_trait::async_trait;
use chrono::Utc;
use crypto::Algorithm;
use uuid::Uuid;

/// Repository capability set for `dek` rows. `rewrap_page` returns up to
/// `limit` DEK rows still wrapped under `from_kek_id`, oldest first, so
/// `rewrap_batch` can page through them without loading the whole table.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DekRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> CoreResult<Dek>;
    async fn insert(&self, dek: Dek) -> CoreResult<()>;
    /// Deletes a DEK row. Callers are responsible for only deleting a DEK
    /// once nothing references it any more (§4.6 "delete removes ... the
    /// associated DEKs").
    async fn delete(&self, id: Uuid) -> CoreResult<()>;
    async fn rewrap_page(&self, from_kek_id: Uuid, limit: u32) -> CoreResult<Vec<Dek>>;
    /// Replaces one DEK's `kek_id`/`wrapped_material` with a version
    /// re-wrapped under a different KEK, transactionally (I7: a DEK is
    /// never observable half-rewrapped).
    async fn update_wrapped(&self, id: Uuid, new_kek_id: Uuid, new_wrapped_material: Vec<u8>) -> CoreResult<()>;
}

/// Stateless orchestration over a [`KekChain`] and a [`DekRepository`];
/// unlike `MasterKeyChain`/`KekChain` this holds no key material itself —
/// every unwrapped DEK is returned to the caller and used immediately,
/// never cached here (the read-through cache in [`crate::cache`] is the
/// place for that).
pub struct DekManager;

impl DekManager {
    /// Generates a new DEK, wraps it under the chain's currently active
    /// KEK, persists the row, and returns both the row and the raw
    /// material the caller needs right now (§4.5 "Create").
    pub async fn create(repo: &dyn DekRepository, kek_chain: &KekChain, algorithm: Algorithm) -> CoreResult<(Dek, [u8; 32])> {
        let active_kek_id = kek_chain.active_kek_id()?;
        let (kek_material, kek_algorithm) = kek_chain.material(active_kek_id)?;

        let material = crypto::aead::generate_key();
        let wrapped = envelope::wrap(kek_algorithm, &kek_material, &material, active_kek_id.as_bytes())?;

        let dek = Dek {
            id: Uuid::new_v4(),
            kek_id: active_kek_id,
            algorithm: algorithm.into(),
            wrapped_material: wrapped,
            created_at: Utc::now(),
        };
        repo.insert(dek.clone()).await?;
        Ok((dek, material))
    }

    /// Unwraps a persisted DEK under whichever KEK it references, which
    /// need not be the chain's currently active one (I6).
    pub fn unwrap(kek_chain: &KekChain, dek: &Dek) -> CoreResult<[u8; 32]> {
        let (kek_material, kek_algorithm) = kek_chain.material(dek.kek_id)?;
        envelope::unwrap(kek_algorithm, &kek_material, &dek.wrapped_material, dek.kek_id.as_bytes())
    }

    /// Re-wraps up to `batch_size` DEKs currently wrapped under
    /// `from_kek_id` so they instead point at the chain's active KEK,
    /// returning how many were moved. Idempotent: once no DEK references
    /// `from_kek_id` any more this returns 0, so callers can loop
    /// `rewrap_batch` until the count is 0 to drive a KEK's DEKs fully
    /// off it after a rotation (§4.10).
    pub async fn rewrap_batch(repo: &dyn DekRepository, kek_chain: &KekChain, from_kek_id: Uuid, batch_size: u32) -> CoreResult<u64> {
        let page = repo.rewrap_page(from_kek_id, batch_size).await?;
        if page.is_empty() {
            return Ok(0);
        }

        let active_kek_id = kek_chain.active_kek_id()?;
        let (active_material, active_algorithm) = kek_chain.material(active_kek_id)?;

        let mut moved = 0u64;
        for dek in page {
            let plaintext = DekManager::unwrap(kek_chain, &dek)?;
            let rewrapped = envelope::wrap(active_algorithm, &active_material, &plaintext, active_kek_id.as_bytes())?;
            repo.update_wrapped(dek.id, active_kek_id, rewrapped).await?;
            moved += 1;
        }
        Ok(moved)
    }
}

#[cfg(test)]
pub mod fakes {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryDekRepository {
        rows: Mutex<HashMap<Uuid, Dek>>,
    }

    #[async_trait]
    impl DekRepository for InMemoryDekRepository {
        async fn get(&self, id: Uuid) -> CoreResult<Dek> {
            self.rows
                .lock()
                .expect("lock poisoned")
                .get(&id)
                .cloned()
                .ok_or_else(|| crate::error::CoreError::NotFound(format!("DEK {id} not found")))
        }

        async fn insert(&self, dek: Dek) -> CoreResult<()> {
            self.rows.lock().expect("lock poisoned").insert(dek.id, dek);
            Ok(())
        }

        async fn delete(&self, id: Uuid) -> CoreResult<()> {
            self.rows.lock().expect("lock poisoned").remove(&id);
            Ok(())
        }

        async fn rewrap_page(&self, from_kek_id: Uuid, limit: u32) -> CoreResult<Vec<Dek>> {
            let rows = self.rows.lock().expect("lock poisoned");
            let mut matching: Vec<Dek> = rows.values().filter(|d| d.kek_id == from_kek_id).cloned().collect();
            matching.sort_by_key(|d| d.created_at);
            matching.truncate(limit as usize);
            Ok(matching)
        }

        async fn update_wrapped(&self, id: Uuid, new_kek_id: Uuid, new_wrapped_material: Vec<u8>) -> CoreResult<()> {
            let mut rows = self.rows.lock().expect("lock poisoned");
            let dek = rows.get_mut(&id).ok_or_else(|| crate::error::CoreError::NotFound(format!("DEK {id} not found")))?;
            dek.kek_id = new_kek_id;
            dek.wrapped_material = new_wrapped_material;
            Ok(())
        }
    }
}
