//! Master Key Chain (§4.3): the outermost layer of the envelope. Master
//! keys never exist in this process as plaintext except immediately after
//! the configured KMS unwraps them at startup, and the chain zeroizes that
//! plaintext on `close()`.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crypto::Keeper;
use std::collections::HashMap;
use zeroize::Zeroizing;

/// One master key: an opaque id plus its 32-byte unwrapped material. I4:
/// held only in a `Zeroizing` buffer, never cloned out except as a
/// transient AEAD parameter.
pub struct MasterKey {
    pub id: String,
    material: Zeroizing<[u8; 32]>,
}

impl MasterKey {
    pub fn material(&self) -> &[u8; 32] {
        &self.material
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey").field("id", &self.id).field("material", &"[redacted]").finish()
    }
}

/// Mapping `id -> MasterKey` plus `active_id` (§3 MasterKeyChain, I1-I4).
pub struct MasterKeyChain {
    keys: HashMap<String, MasterKey>,
    active_id: String,
}

impl MasterKeyChain {
    /// Loads per §4.3: parse `MASTER_KEYS`, open a Keeper for `KMS_KEY_URI`,
    /// base64-decode then KMS-decrypt every entry, and fail the whole load
    /// (fail-fast, I3) if any entry fails to decrypt to exactly 32 bytes.
    pub async fn load(config: &Config, keeper: &dyn Keeper) -> CoreResult<Self> {
        if config.master_keys.is_empty() {
            return Err(CoreError::Config("MASTER_KEYS must contain at least one entry (I1)".to_string()));
        }

        let mut keys = HashMap::with_capacity(config.master_keys.len());
        for (id, ciphertext_b64) in &config.master_keys {
            let ciphertext = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, ciphertext_b64)
                .map_err(|e| CoreError::Config(format!("MASTER_KEYS entry '{id}': invalid base64: {e}")))?;

            let plaintext = keeper
                .decrypt(&ciphertext)
                .await
                .map_err(|e| CoreError::Config(format!("MASTER_KEYS entry '{id}': KMS decrypt failed: {e}")))?;

            if plaintext.len() != 32 {
                return Err(CoreError::Config(format!(
                    "MASTER_KEYS entry '{id}': expected 32-byte material, got {} bytes",
                    plaintext.len()
                )));
            }
            let mut material = [0u8; 32];
            material.copy_from_slice(&plaintext);

            keys.insert(id.clone(), MasterKey { id: id.clone(), material: Zeroizing::new(material) });
        }

        if !keys.contains_key(&config.active_master_key_id) {
            return Err(CoreError::Config(format!(
                "ACTIVE_MASTER_KEY_ID '{}' does not resolve in MASTER_KEYS (I2)",
                config.active_master_key_id
            )));
        }

        Ok(Self { keys, active_id: config.active_master_key_id.clone() })
    }

    pub fn active(&self) -> CoreResult<&MasterKey> {
        self.keys
            .get(&self.active_id)
            .ok_or_else(|| CoreError::NotFound(format!("active master key '{}' missing", self.active_id)))
    }

    pub fn get(&self, id: &str) -> Option<&MasterKey> {
        self.keys.get(id)
    }

    pub fn active_id(&self) -> &str {
        &self.active_id
    }

    /// Overwrites every held master key's material with zero bytes.
    /// `Zeroizing` already does this on drop; this makes the guarantee
    /// observable before the chain itself is dropped (e.g. at shutdown).
    pub fn close(&mut self) {
        for key in self.keys.values_mut() {
            key.material.fill(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto::kms::LocalKeeper;

    fn b64(bytes: &[u8]) -> String {
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)
    }

    fn config_with(entries: &[(&str, String)], active: &str) -> Config {
        let mut cfg = Config::minimal_for_test();
        cfg.active_master_key_id = active.to_string();
        cfg.master_keys = entries.iter().map(|(id, b64)| (id.to_string(), b64.clone())).collect();
        cfg
    }

    #[tokio::test]
    async fn loads_and_resolves_active_key() {
        let kms_key = crypto::aead::generate_key();
        let keeper = LocalKeeper::new(kms_key);
        let material = crypto::aead::generate_key();
        let ciphertext = keeper.encrypt(&material).await.unwrap();

        let config = config_with(&[("m1", b64(&ciphertext))], "m1");
        let chain = MasterKeyChain::load(&config, &keeper).await.unwrap();

        assert_eq!(chain.active().unwrap().material(), &material);
        assert_eq!(chain.active_id(), "m1");
    }

    #[tokio::test]
    async fn rejects_unknown_active_id() {
        let keeper = LocalKeeper::new(crypto::aead::generate_key());
        let ciphertext = keeper.encrypt(&crypto::aead::generate_key()).await.unwrap();
        let config = config_with(&[("m1", b64(&ciphertext))], "does-not-exist");
        let result = MasterKeyChain::load(&config, &keeper).await;
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[tokio::test]
    async fn rejects_wrong_length_material_fail_fast() {
        let keeper = LocalKeeper::new(crypto::aead::generate_key());
        let ciphertext = keeper.encrypt(b"too-short").await.unwrap();
        let config = config_with(&[("m1", b64(&ciphertext))], "m1");
        let result = MasterKeyChain::load(&config, &keeper).await;
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[tokio::test]
    async fn rejects_empty_master_keys() {
        let keeper = LocalKeeper::new(crypto::aead::generate_key());
        let config = Config::minimal_for_test();
        let result = MasterKeyChain::load(&config, &keeper).await;
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[tokio::test]
    async fn close_zeroizes_material() {
        let keeper = LocalKeeper::new(crypto::aead::generate_key());
        let ciphertext = keeper.encrypt(&crypto::aead::generate_key()).await.unwrap();
        let config = config_with(&[("m1", b64(&ciphertext))], "m1");
        let mut chain = MasterKeyChain::load(&config, &keeper).await.unwrap();
        chain.close();
        assert_eq!(chain.active().unwrap().material(), &[0u8; 32]);
    }
}
