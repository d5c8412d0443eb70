//! Transit Engine (§4.7): named, versioned DEK containers used to
//! encrypt/decrypt client-supplied plaintext on the fly. Neither the
//! plaintext nor the resulting ciphertext is stored by this engine itself.

use crate::dek::{DekManager, DekRepository};
use crate::error::{CoreError, CoreResult};
use crate::kek::KekChain;
use crate::model::TransitKey;
use async_trait::async_trait;
use chrono::Utc;
use crypto::{aead, Algorithm};
use uuid::Uuid;

const VERSION_PREFIX_LEN: usize = 4;

#[async_trait]
pub trait TransitKeyRepository: Send + Sync {
    async fn latest(&self, name: &str) -> CoreResult<Option<TransitKey>>;
    async fn by_version(&self, name: &str, version: i64) -> CoreResult<Option<TransitKey>>;
    async fn insert(&self, key: TransitKey) -> CoreResult<()>;
}

fn validate_name(name: &str) -> CoreResult<()> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(CoreError::Validation(format!("transit key name '{name}' must match [A-Za-z0-9_-]{{1,64}}")))
    }
}

fn aad(name: &str, version: i64) -> Vec<u8> {
    let mut aad = name.as_bytes().to_vec();
    aad.extend_from_slice(&version.to_be_bytes());
    aad
}

pub struct TransitEngine;

impl TransitEngine {
    pub async fn create_key(repo: &dyn TransitKeyRepository, dek_repo: &dyn DekRepository, kek_chain: &KekChain, name: &str, algorithm: Algorithm) -> CoreResult<TransitKey> {
        validate_name(name)?;
        if repo.latest(name).await?.is_some() {
            return Err(CoreError::Conflict(format!("transit key '{name}' already exists")));
        }
        let (dek, _) = DekManager::create(dek_repo, kek_chain, algorithm).await?;
        let key = TransitKey { id: Uuid::new_v4(), name: name.to_string(), version: 1, dek_id: dek.id, algorithm: algorithm.into(), created_at: Utc::now() };
        repo.insert(key.clone()).await?;
        Ok(key)
    }

    /// Allocates a new DEK wrapped by the active KEK and inserts a new
    /// version row sharing `name`; prior versions keep decrypting under
    /// their own DEK.
    pub async fn rotate_key(repo: &dyn TransitKeyRepository, dek_repo: &dyn DekRepository, kek_chain: &KekChain, name: &str) -> CoreResult<TransitKey> {
        let current = repo
            .latest(name)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("no transit key named '{name}'")))?;
        let (dek, _) = DekManager::create(dek_repo, kek_chain, *current.algorithm).await?;
        let next = TransitKey {
            id: Uuid::new_v4(),
            name: name.to_string(),
            version: current.version + 1,
            dek_id: dek.id,
            algorithm: current.algorithm,
            created_at: Utc::now(),
        };
        repo.insert(next.clone()).await?;
        Ok(next)
    }

    /// Encrypts under the latest version, returning the wire format
    /// `version_be32 || nonce(12) || ciphertext_with_tag` (§6).
    pub async fn encrypt(repo: &dyn TransitKeyRepository, dek_repo: &dyn DekRepository, kek_chain: &KekChain, name: &str, plaintext: &[u8]) -> CoreResult<Vec<u8>> {
        let key = repo
            .latest(name)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("no transit key named '{name}'")))?;
        let dek = dek_repo.get(key.dek_id).await?;
        let material = DekManager::unwrap(kek_chain, &dek)?;

        let (nonce, ciphertext) = aead::encrypt(*key.algorithm, &material, plaintext, &aad(name, key.version))?;

        let mut out = Vec::with_capacity(VERSION_PREFIX_LEN + nonce.len() + ciphertext.len());
        out.extend_from_slice(&(key.version as u32).to_be_bytes());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Parses the leading version from `blob` and decrypts with that
    /// version's DEK, failing `NotFoundError` if that version no longer
    /// exists.
    pub async fn decrypt(repo: &dyn TransitKeyRepository, dek_repo: &dyn DekRepository, kek_chain: &KekChain, name: &str, blob: &[u8]) -> CoreResult<Vec<u8>> {
        if blob.len() < VERSION_PREFIX_LEN + aead::NONCE_LEN {
            return Err(CoreError::Validation("transit ciphertext shorter than version+nonce prefix".to_string()));
        }
        let (version_bytes, rest) = blob.split_at(VERSION_PREFIX_LEN);
        let version = u32::from_be_bytes(version_bytes.try_into().expect("checked length above")) as i64;
        let (nonce, ciphertext) = rest.split_at(aead::NONCE_LEN);

        let key = repo
            .by_version(name, version)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("transit key '{name}' has no version {version}")))?;
        let dek = dek_repo.get(key.dek_id).await?;
        let material = DekManager::unwrap(kek_chain, &dek)?;

        Ok(aead::decrypt(*key.algorithm, &material, nonce, ciphertext, &aad(name, version))?)
    }
}
