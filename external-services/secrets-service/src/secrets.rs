//! Secrets Engine (§4.6): path-addressed, versioned secrets backed by a
//! per-path DEK. Every version under a path shares that path's DEK; only
//! the AEAD ciphertext changes between versions.

use crate::dek::{DekManager, DekRepository};
use crate::error::{CoreError, CoreResult};
use crate::kek::KekChain;
use crate::model::Secret;
use async_trait::async_trait;
use chrono::Utc;
use crypto::{aead, Algorithm};
use uuid::Uuid;

pub const MAX_PATH_LEN: usize = 512;

#[async_trait]
pub trait SecretRepository: Send + Sync {
    /// The DEK a path already uses, if any version has ever been written.
    async fn dek_for_path(&self, path: &str) -> CoreResult<Option<Uuid>>;
    async fn max_version(&self, path: &str) -> CoreResult<Option<i64>>;
    async fn insert(&self, secret: Secret) -> CoreResult<()>;
    async fn latest(&self, path: &str) -> CoreResult<Option<Secret>>;
    async fn by_version(&self, path: &str, version: i64) -> CoreResult<Option<Secret>>;
    /// Deletes every version under `path` and returns the DEK id that was
    /// exclusively theirs, so the caller can delete it too.
    async fn delete_by_path(&self, path: &str) -> CoreResult<Option<Uuid>>;
}

pub struct SecretsEngine;

impl SecretsEngine {
    fn validate_path(path: &str) -> CoreResult<()> {
        if path.is_empty() {
            return Err(CoreError::Validation("secret path must not be empty".to_string()));
        }
        if path.len() > MAX_PATH_LEN {
            return Err(CoreError::Validation(format!("secret path exceeds {MAX_PATH_LEN} bytes")));
        }
        Ok(())
    }

    fn aad(path: &str, version: i64) -> Vec<u8> {
        let mut aad = path.as_bytes().to_vec();
        aad.extend_from_slice(&version.to_be_bytes());
        aad
    }

    /// Computes `version = 1 + current_max_version(path)`, reuses the
    /// path's existing DEK (or creates one), encrypts, and inserts a new
    /// row — all against repositories the caller is expected to run in
    /// one transaction (§5 ordering guarantees). A concurrent writer to
    /// the same path can win the race on `version`, in which case the
    /// insert comes back `Conflict`; per §7 that is retried here, bounded
    /// by `max_attempts`, recomputing `max_version` each time (mirrors the
    /// token-insert retry in `tokenization.rs`).
    pub async fn create_or_update(
        secret_repo: &dyn SecretRepository,
        dek_repo: &dyn DekRepository,
        kek_chain: &KekChain,
        path: &str,
        plaintext: &[u8],
        algorithm: Algorithm,
        max_attempts: u32,
    ) -> CoreResult<Secret> {
        Self::validate_path(path)?;

        let (dek_id, dek_material, dek_algorithm) = match secret_repo.dek_for_path(path).await? {
            Some(dek_id) => {
                let dek = dek_repo.get(dek_id).await?;
                let material = DekManager::unwrap(kek_chain, &dek)?;
                (dek_id, material, *dek.algorithm)
            }
            None => {
                let (dek, material) = DekManager::create(dek_repo, kek_chain, algorithm).await?;
                (dek.id, material, algorithm)
            }
        };

        for _ in 0..max_attempts.max(1) {
            let version = 1 + secret_repo.max_version(path).await?.unwrap_or(0);
            let aad = Self::aad(path, version);
            let (nonce, ciphertext) = aead::encrypt(dek_algorithm, &dek_material, plaintext, &aad)?;

            let secret = Secret {
                id: Uuid::new_v4(),
                path: path.to_string(),
                version,
                dek_id,
                ciphertext,
                nonce,
                created_at: Utc::now(),
            };
            match secret_repo.insert(secret.clone()).await {
                Ok(()) => return Ok(secret),
                Err(CoreError::Conflict(_)) => continue,
                Err(other) => return Err(other),
            }
        }
        Err(CoreError::Conflict(format!("could not allocate a version for '{path}' after {max_attempts} attempts")))
    }

    pub async fn get(secret_repo: &dyn SecretRepository, dek_repo: &dyn DekRepository, kek_chain: &KekChain, path: &str) -> CoreResult<Vec<u8>> {
        let secret = secret_repo
            .latest(path)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("no secret at path '{path}'")))?;
        Self::decrypt_row(dek_repo, kek_chain, &secret).await
    }

    pub async fn get_by_version(
        secret_repo: &dyn SecretRepository,
        dek_repo: &dyn DekRepository,
        kek_chain: &KekChain,
        path: &str,
        version: i64,
    ) -> CoreResult<Vec<u8>> {
        let secret = secret_repo
            .by_version(path, version)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("no secret at path '{path}' version {version}")))?;
        Self::decrypt_row(dek_repo, kek_chain, &secret).await
    }

    async fn decrypt_row(dek_repo: &dyn DekRepository, kek_chain: &KekChain, secret: &Secret) -> CoreResult<Vec<u8>> {
        let dek = dek_repo.get(secret.dek_id).await?;
        let material = DekManager::unwrap(kek_chain, &dek)?;
        let aad = Self::aad(&secret.path, secret.version);
        Ok(aead::decrypt(*dek.algorithm, &material, &secret.nonce, &secret.ciphertext, &aad)?)
    }

    /// Removes all versions under `path` plus the DEK that was exclusively
    /// theirs.
    pub async fn delete(secret_repo: &dyn SecretRepository, dek_repo: &dyn DekRepository, path: &str) -> CoreResult<()> {
        if let Some(dek_id) = secret_repo.delete_by_path(path).await? {
            dek_repo.delete(dek_id).await?;
        }
        Ok(())
    }
}
