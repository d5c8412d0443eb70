//! Rotation protocols (§2, §4.10): the orchestration layer that drives a
//! KEK rotation to completion. The primitives themselves —
//! `KekChain::rotate_kek`, `DekManager::rewrap_batch` — are deliberately
//! small and composable; this module is where an operator-facing CLI or
//! a scheduled job would call in, since §5 says the core never spawns
//! background threads of its own.

use crate::dek::{DekManager, DekRepository};
use crate::error::CoreResult;
use crate::kek::{KekChain, KekRepository};
use crate::master::MasterKeyChain;
use crypto::Algorithm;
use uuid::Uuid;

/// The result of driving one KEK rotation's DEK re-wrap to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationReport {
    pub old_kek_id: Uuid,
    pub new_kek_id: Uuid,
    pub deks_rewrapped: u64,
}

/// Rotates the active KEK, then loops `rewrap_batch` against the just-
/// retired KEK until no DEK references it any more (§4.10's "Inactive,
/// deks migrating" → "Drainable" transition). Each batch is its own
/// transaction; a failure partway through leaves prior batches durable
/// and the caller can simply call this again (`rewrap_batch` is
/// idempotent, §4.5).
pub async fn rotate_kek_and_drain(
    kek_repo: &dyn KekRepository,
    dek_repo: &dyn DekRepository,
    kek_chain: &KekChain,
    master_chain: &MasterKeyChain,
    algorithm: Algorithm,
    batch_size: u32,
) -> CoreResult<RotationReport> {
    let old_kek_id = kek_chain.active_kek_id()?;
    let new_kek = kek_chain.rotate_kek(kek_repo, master_chain, algorithm).await?;

    let mut rewrapped = 0u64;
    loop {
        let moved = DekManager::rewrap_batch(dek_repo, kek_chain, old_kek_id, batch_size).await?;
        if moved == 0 {
            break;
        }
        rewrapped += moved;
    }

    Ok(RotationReport { old_kek_id, new_kek_id: new_kek.id, deks_rewrapped: rewrapped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dek::fakes::InMemoryDekRepository;
    use crate::kek::fakes::InMemoryKekRepository;
    use crypto::kms::LocalKeeper;

    async fn master_chain_with_one_key() -> MasterKeyChain {
        let kms_material = crypto::aead::generate_key();
        let keeper = LocalKeeper::new(kms_material);
        let ciphertext = keeper.encrypt(&crypto::aead::generate_key()).await.unwrap();

        let mut config = Config::minimal_for_test();
        config.master_keys = vec![(
            "m1".to_string(),
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &ciphertext),
        )];
        config.active_master_key_id = "m1".to_string();

        MasterKeyChain::load(&config, &keeper).await.unwrap()
    }

    #[tokio::test]
    async fn drains_every_dek_off_the_retired_kek() {
        let master_chain = master_chain_with_one_key().await;
        let kek_repo = InMemoryKekRepository::default();
        let old_kek = KekChain::create_kek(&kek_repo, &master_chain, Algorithm::Aes256Gcm).await.unwrap();
        let kek_chain = KekChain::unwrap(&kek_repo, &master_chain).await.unwrap();

        let dek_repo = InMemoryDekRepository::default();
        for _ in 0..7 {
            DekManager::create(&dek_repo, &kek_chain, Algorithm::Aes256Gcm).await.unwrap();
        }

        let report = rotate_kek_and_drain(&kek_repo, &dek_repo, &kek_chain, &master_chain, Algorithm::ChaCha20Poly1305, 3).await.unwrap();

        assert_eq!(report.old_kek_id, old_kek.id);
        assert_eq!(report.deks_rewrapped, 7);
        assert_eq!(DekManager::rewrap_batch(&dek_repo, &kek_chain, old_kek.id, 100).await.unwrap(), 0);
    }
}
