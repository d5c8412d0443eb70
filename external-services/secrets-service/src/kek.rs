//! KEK store & `KekChain` (§4.4): the persisted, master-wrapped
//! Key-Encryption-Keys and the in-memory chain built by unwrapping them.

use crate::envelope;
use crate::error::{CoreError, CoreResult};
use crate::master::MasterKeyChain;
use crate::model::Kek;
use async_trait::async_trait;
use chrono::Utc;
use crypto::Algorithm;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Repository capability set for `kek` rows (§4.4, §9's "capability set"
/// re-architecture of driver polymorphism). `rotate` performs the I5
/// at-most-one-active flip transactionally: implementations must insert
/// the new row and flip the old row's `is_active` in one transaction
/// (SERIALIZABLE, or a partial unique index plus the same transaction).
#[async_trait]
pub trait KekRepository: Send + Sync {
    async fn list_all(&self) -> CoreResult<Vec<Kek>>;
    async fn get_active(&self) -> CoreResult<Option<Kek>>;
    async fn insert(&self, kek: Kek) -> CoreResult<()>;
    async fn mark_inactive(&self, id: Uuid) -> CoreResult<()>;
    /// Atomically marks `old_active` (if any) inactive and inserts
    /// `new_kek` as the sole active row.
    async fn rotate(&self, old_active: Option<Uuid>, new_kek: Kek) -> CoreResult<()>;
}

struct ChainEntry {
    algorithm: Algorithm,
    material: Zeroizing<[u8; 32]>,
}

/// In-memory mapping `kek_id -> (algorithm, unwrapped_material)` plus
/// `active_kek_id` (§4.4 "Unwrap into chain"). Read-mostly per §5: built
/// once at startup and rebuilt after a rotation; everyday reads take the
/// read half of an `RwLock`.
pub struct KekChain {
    entries: RwLock<HashMap<Uuid, ChainEntry>>,
    active_kek_id: RwLock<Option<Uuid>>,
}

impl KekChain {
    /// Lists every persisted KEK and decrypts it under the matching master
    /// key. A KEK whose `master_key_id` is absent from `master_chain`
    /// fails the whole build with `NotFoundError`, per §4.4.
    pub async fn unwrap(repo: &dyn KekRepository, master_chain: &MasterKeyChain) -> CoreResult<Self> {
        let rows = repo.list_all().await?;
        let mut entries = HashMap::with_capacity(rows.len());
        let mut active_kek_id = None;

        for row in rows {
            let master = master_chain.get(&row.master_key_id).ok_or_else(|| {
                CoreError::NotFound(format!("master key '{}' referenced by KEK {} is not loaded", row.master_key_id, row.id))
            })?;
            let material = envelope::unwrap(*row.algorithm, master.material(), &row.wrapped_material, row.master_key_id.as_bytes())?;
            if row.is_active {
                active_kek_id = Some(row.id);
            }
            entries.insert(row.id, ChainEntry { algorithm: *row.algorithm, material: Zeroizing::new(material) });
        }

        Ok(Self { entries: RwLock::new(entries), active_kek_id: RwLock::new(active_kek_id) })
    }

    pub fn active_kek_id(&self) -> CoreResult<Uuid> {
        self.active_kek_id.read().expect("KekChain lock poisoned").ok_or_else(crate::error::no_active_kek)
    }

    /// Copies out the unwrapped material for `kek_id` as a transient value;
    /// callers must not retain it beyond the AEAD call it feeds (§5).
    pub fn material(&self, kek_id: Uuid) -> CoreResult<([u8; 32], Algorithm)> {
        let entries = self.entries.read().expect("KekChain lock poisoned");
        let entry = entries.get(&kek_id).ok_or_else(|| CoreError::NotFound(format!("KEK {kek_id} not present in chain")))?;
        Ok((*entry.material, entry.algorithm))
    }

    pub fn contains(&self, kek_id: Uuid) -> bool {
        self.entries.read().expect("KekChain lock poisoned").contains_key(&kek_id)
    }

    /// Generates a fresh KEK, wraps it under the active master key, and
    /// persists it as the sole active row (§4.4 "Create").
    pub async fn create_kek(repo: &dyn KekRepository, master_chain: &MasterKeyChain, algorithm: Algorithm) -> CoreResult<Kek> {
        let active_master = master_chain.active()?;
        let material = crypto::aead::generate_key();
        let wrapped = envelope::wrap(algorithm, active_master.material(), &material, active_master.id.as_bytes())?;

        let kek = Kek {
            id: Uuid::new_v4(),
            algorithm: algorithm.into(),
            is_active: true,
            master_key_id: active_master.id.clone(),
            wrapped_material: wrapped,
            created_at: Utc::now(),
        };
        repo.insert(kek.clone()).await?;
        Ok(kek)
    }

    /// Rotates the active KEK: a new KEK, wrapped under the currently
    /// active master key, becomes active; the previous active row is
    /// flipped to inactive in the same transaction (§4.4 "Rotate", I5).
    /// Updates this in-memory chain in place so callers don't need to
    /// rebuild it from the repository.
    pub async fn rotate_kek(&self, repo: &dyn KekRepository, master_chain: &MasterKeyChain, algorithm: Algorithm) -> CoreResult<Kek> {
        let old_active = repo.get_active().await?;
        let active_master = master_chain.active()?;
        let material = crypto::aead::generate_key();
        let wrapped = envelope::wrap(algorithm, active_master.material(), &material, active_master.id.as_bytes())?;

        let new_kek = Kek {
            id: Uuid::new_v4(),
            algorithm: algorithm.into(),
            is_active: true,
            master_key_id: active_master.id.clone(),
            wrapped_material: wrapped,
            created_at: Utc::now(),
        };

        repo.rotate(old_active.as_ref().map(|k| k.id), new_kek.clone()).await?;

        {
            let mut active = self.active_kek_id.write().expect("KekChain lock poisoned");
            *active = Some(new_kek.id);
        }
        {
            let mut entries = self.entries.write().expect("KekChain lock poisoned");
            entries.insert(new_kek.id, ChainEntry { algorithm, material: Zeroizing::new(material) });
        }

        Ok(new_kek)
    }

    /// Zeroizes every held KEK's unwrapped material.
    pub fn close(&self) {
        let mut entries = self.entries.write().expect("KekChain lock poisoned");
        for entry in entries.values_mut() {
            entry.material.fill(0);
        }
    }
}
