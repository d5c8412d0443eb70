//! A local, symmetric-key KMS stand-in for tests and local development
//! (§4.2's "must support at minimum a local provider"). The key lives in
//! the URI itself — never use this scheme against real master-key material
//! in a deployed environment.

use super::Keeper;
use crate::aead::{self, Algorithm};
use crate::error::{KmsError, KmsResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::atomic::{AtomicBool, Ordering};
use zeroize::Zeroizing;

pub struct LocalKeeper {
    key: Zeroizing<[u8; 32]>,
    closed: AtomicBool,
}

impl LocalKeeper {
    /// `rest` is the URI body after `local://`: a base64-encoded 32-byte key.
    pub fn from_uri(rest: &str) -> KmsResult<Self> {
        let bytes = STANDARD.decode(rest).map_err(|e| KmsError::Open {
            uri: format!("local://{rest}"),
            reason: format!("invalid base64 key: {e}"),
        })?;
        if bytes.len() != 32 {
            return Err(KmsError::Open {
                uri: format!("local://{rest}"),
                reason: format!("expected 32-byte key, got {} bytes", bytes.len()),
            });
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(Self {
            key: Zeroizing::new(key),
            closed: AtomicBool::new(false),
        })
    }

    pub fn new(key: [u8; 32]) -> Self {
        Self {
            key: Zeroizing::new(key),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Keeper for LocalKeeper {
    async fn encrypt(&self, plaintext: &[u8]) -> KmsResult<Vec<u8>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(KmsError::Closed);
        }
        let (nonce, ciphertext) = aead::encrypt(Algorithm::Aes256Gcm, &self.key, plaintext, b"")
            .map_err(|e| KmsError::Encrypt(e.to_string()))?;
        let mut out = nonce;
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> KmsResult<Vec<u8>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(KmsError::Closed);
        }
        if ciphertext.len() < aead::NONCE_LEN {
            return Err(KmsError::Decrypt("ciphertext shorter than nonce".to_string()));
        }
        let (nonce, body) = ciphertext.split_at(aead::NONCE_LEN);
        aead::decrypt(Algorithm::Aes256Gcm, &self.key, nonce, body, b"")
            .map_err(|e| KmsError::Decrypt(e.to_string()))
    }

    async fn close(&self) -> KmsResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrip() {
        let key = aead::generate_key();
        let keeper = LocalKeeper::new(key);
        let ciphertext = keeper.encrypt(b"master key material").await.unwrap();
        let plaintext = keeper.decrypt(&ciphertext).await.unwrap();
        assert_eq!(plaintext, b"master key material");
    }

    #[tokio::test]
    async fn from_uri_parses_base64_key() {
        let key = aead::generate_key();
        let uri_body = STANDARD.encode(key);
        let keeper = LocalKeeper::from_uri(&uri_body).unwrap();
        let ciphertext = keeper.encrypt(b"hello").await.unwrap();
        assert_eq!(keeper.decrypt(&ciphertext).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn rejects_wrong_length_key() {
        let short = STANDARD.encode(b"too short");
        assert!(LocalKeeper::from_uri(&short).is_err());
    }

    #[tokio::test]
    async fn closed_keeper_rejects_operations() {
        let keeper = LocalKeeper::new(aead::generate_key());
        keeper.close().await.unwrap();
        assert!(keeper.encrypt(b"x").await.is_err());
        assert!(keeper.decrypt(b"x").await.is_err());
    }
}
