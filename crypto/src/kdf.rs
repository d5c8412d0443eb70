use crate::error::CryptoError;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Key derivation result
pub type KdfResult<T> = Result<T, CryptoError>;

/// Key Derivation Function utilities: HKDF-Expand (RFC 5869) for deriving
/// per-purpose subkeys out of a KEK or DEK, and HMAC-SHA256 for the audit
/// signing primitive and deterministic-tokenization index hash.
pub struct Kdf;

impl Kdf {
    /// HKDF (HMAC-based Key Derivation Function) - RFC 5869.
    ///
    /// Derives `length` bytes from `ikm` with `salt` and `info` bound in,
    /// e.g. `Kdf::hkdf(kek_material, kek_id.as_bytes(), b"audit-sign", 32)`
    /// for the audit log's per-KEK signing subkey (§4.9).
    pub fn hkdf(ikm: &[u8], salt: &[u8], info: &[u8], length: usize) -> KdfResult<Zeroizing<Vec<u8>>> {
        let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm);
        let mut okm = Zeroizing::new(vec![0u8; length]);

        hkdf.expand(info, &mut okm)
            .map_err(|_| CryptoError::KeyDerivationFailed("HKDF expand failed".to_string()))?;

        Ok(okm)
    }

    /// Derive multiple independent subkeys from one input key material.
    pub fn derive_multiple_keys(
        ikm: &[u8],
        salt: &[u8],
        contexts: &[&str],
        key_length: usize,
    ) -> KdfResult<Vec<Zeroizing<Vec<u8>>>> {
        contexts
            .iter()
            .map(|context| Self::hkdf(ikm, salt, context.as_bytes(), key_length))
            .collect()
    }

    /// HMAC-SHA256 over `message` keyed by `key`. Used both for audit-entry
    /// signatures and for the deterministic-tokenization plaintext index.
    pub fn hmac_sha256(key: &[u8], message: &[u8]) -> KdfResult<[u8; 32]> {
        let mut mac = Hmac::<Sha256>::new_from_slice(key)
            .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
        mac.update(message);
        let result = mac.finalize().into_bytes();
        let mut out = [0u8; 32];
        out.copy_from_slice(&result);
        Ok(out)
    }

    /// Generate a cryptographically secure random salt.
    pub fn generate_salt(length: usize) -> Vec<u8> {
        let mut salt = vec![0u8; length];
        rand::thread_rng().fill_bytes(&mut salt);
        salt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hkdf_is_deterministic() {
        let ikm = b"master_secret_key_material";
        let salt = b"random_salt";
        let info = b"application_context";

        let key1 = Kdf::hkdf(ikm, salt, info, 32).unwrap();
        let key2 = Kdf::hkdf(ikm, salt, info, 32).unwrap();

        assert_eq!(*key1, *key2);
        assert_eq!(key1.len(), 32);
    }

    #[test]
    fn hkdf_different_contexts_diverge() {
        let ikm = b"master_secret";
        let salt = b"salt";

        let key1 = Kdf::hkdf(ikm, salt, b"context1", 32).unwrap();
        let key2 = Kdf::hkdf(ikm, salt, b"context2", 32).unwrap();

        assert_ne!(*key1, *key2);
    }

    #[test]
    fn derive_multiple_keys_are_pairwise_distinct() {
        let ikm = b"master_secret";
        let salt = b"salt";
        let contexts = ["encryption", "signing", "authentication"];

        let keys = Kdf::derive_multiple_keys(ikm, salt, &contexts, 32).unwrap();

        assert_eq!(keys.len(), 3);
        assert_ne!(*keys[0], *keys[1]);
        assert_ne!(*keys[1], *keys[2]);
        assert_ne!(*keys[0], *keys[2]);
    }

    #[test]
    fn hmac_is_deterministic_and_keyed() {
        let key1 = b"kek-derived-signing-key-aaaaaaa";
        let key2 = b"kek-derived-signing-key-bbbbbbb";
        let msg = b"canonical audit row bytes";

        let mac1a = Kdf::hmac_sha256(key1, msg).unwrap();
        let mac1b = Kdf::hmac_sha256(key1, msg).unwrap();
        let mac2 = Kdf::hmac_sha256(key2, msg).unwrap();

        assert_eq!(mac1a, mac1b);
        assert_ne!(mac1a, mac2);
    }

    #[test]
    fn salt_generation_is_unique() {
        let salt1 = Kdf::generate_salt(32);
        let salt2 = Kdf::generate_salt(32);

        assert_ne!(salt1, salt2);
        assert_eq!(salt1.len(), 32);
    }
}
