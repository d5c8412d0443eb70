//! AEAD primitives (§4.1): AES-256-GCM and ChaCha20-Poly1305 behind one
//! algorithm-tagged `encrypt`/`decrypt` pair, with strict nonce discipline.
//!
//! Both algorithms use a 12-byte nonce drawn fresh from a CSPRNG on every
//! call and a 16-byte tag appended to the ciphertext. Counter nonces are
//! deliberately not offered here: DEKs may be used concurrently by many
//! request handlers with no shared counter, so a random nonce is the only
//! safe default at this layer.

use crate::error::{CryptoError, CryptoResult};
use aes_gcm::{aead::Aead as _, Aes256Gcm, KeyInit as _, Nonce as AesNonce};
use chacha20poly1305::{ChaCha20Poly1305, Nonce as ChaChaNonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const KEY_LEN: usize = 32;

/// The two AEAD ciphers a KEK or DEK may be wrapped/used with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl Algorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Aes256Gcm => "aes-256-gcm",
            Algorithm::ChaCha20Poly1305 => "chacha20-poly1305",
        }
    }
}

impl std::str::FromStr for Algorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aes-256-gcm" | "AES-GCM" | "aes_256_gcm" => Ok(Algorithm::Aes256Gcm),
            "chacha20-poly1305" | "ChaCha20-Poly1305" | "chacha20_poly1305" => {
                Ok(Algorithm::ChaCha20Poly1305)
            }
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encrypt `plaintext` under `key` with `aad` bound to the ciphertext.
///
/// Returns `(nonce, ciphertext_with_tag)`. The tag is the trailing 16 bytes
/// of the returned ciphertext.
pub fn encrypt(
    algorithm: Algorithm,
    key: &[u8; KEY_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> CryptoResult<(Vec<u8>, Vec<u8>)> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = match algorithm {
        Algorithm::Aes256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::EncryptionFailed)?;
            let payload = aes_gcm::aead::Payload { msg: plaintext, aad };
            cipher
                .encrypt(AesNonce::from_slice(&nonce_bytes), payload)
                .map_err(|_| CryptoError::EncryptionFailed)?
        }
        Algorithm::ChaCha20Poly1305 => {
            let cipher =
                ChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::EncryptionFailed)?;
            let payload = chacha20poly1305::aead::Payload { msg: plaintext, aad };
            cipher
                .encrypt(ChaChaNonce::from_slice(&nonce_bytes), payload)
                .map_err(|_| CryptoError::EncryptionFailed)?
        }
    };

    Ok((nonce_bytes.to_vec(), ciphertext))
}

/// Decrypt `ciphertext` (with trailing tag) under `key`, verifying `aad`.
///
/// Fails with `CryptoError::DecryptionFailed` on any tag mismatch, and with
/// `InvalidNonceLength` if `nonce` is not exactly 12 bytes.
pub fn decrypt(
    algorithm: Algorithm,
    key: &[u8; KEY_LEN],
    nonce: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::InvalidNonceLength {
            expected: NONCE_LEN,
            got: nonce.len(),
        });
    }

    match algorithm {
        Algorithm::Aes256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::DecryptionFailed)?;
            let payload = aes_gcm::aead::Payload { msg: ciphertext, aad };
            cipher
                .decrypt(AesNonce::from_slice(nonce), payload)
                .map_err(|_| CryptoError::DecryptionFailed)
        }
        Algorithm::ChaCha20Poly1305 => {
            let cipher =
                ChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::DecryptionFailed)?;
            let payload = chacha20poly1305::aead::Payload { msg: ciphertext, aad };
            cipher
                .decrypt(ChaChaNonce::from_slice(nonce), payload)
                .map_err(|_| CryptoError::DecryptionFailed)
        }
    }
}

/// Generate a fresh random 32-byte key (DEK or KEK material).
pub fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(alg: Algorithm) {
        let key = generate_key();
        let aad = b"path/to/secret||\x00\x00\x00\x00\x00\x00\x00\x01";
        let plaintext = b"s3cret-v1";

        let (nonce, ciphertext) = encrypt(alg, &key, plaintext, aad).unwrap();
        let decrypted = decrypt(alg, &key, &nonce, &ciphertext, aad).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn aes_gcm_roundtrip() {
        roundtrip(Algorithm::Aes256Gcm);
    }

    #[test]
    fn chacha20poly1305_roundtrip() {
        roundtrip(Algorithm::ChaCha20Poly1305);
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let key = generate_key();
        let (nonce, ciphertext) = encrypt(Algorithm::Aes256Gcm, &key, b"", b"aad").unwrap();
        let decrypted = decrypt(Algorithm::Aes256Gcm, &key, &nonce, &ciphertext, b"aad").unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn tampered_aad_fails() {
        let key = generate_key();
        let (nonce, ciphertext) = encrypt(Algorithm::Aes256Gcm, &key, b"hello", b"aad-1").unwrap();
        let result = decrypt(Algorithm::Aes256Gcm, &key, &nonce, &ciphertext, b"aad-2");
        assert!(result.is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = generate_key();
        let (nonce, mut ciphertext) = encrypt(Algorithm::Aes256Gcm, &key, b"hello", b"aad").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0x01;
        let result = decrypt(Algorithm::Aes256Gcm, &key, &nonce, &ciphertext, b"aad");
        assert!(result.is_err());
    }

    #[test]
    fn tampered_nonce_fails() {
        let key = generate_key();
        let (mut nonce, ciphertext) = encrypt(Algorithm::Aes256Gcm, &key, b"hello", b"aad").unwrap();
        nonce[0] ^= 0x01;
        let result = decrypt(Algorithm::Aes256Gcm, &key, &nonce, &ciphertext, b"aad");
        assert!(result.is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let key1 = generate_key();
        let key2 = generate_key();
        let (nonce, ciphertext) = encrypt(Algorithm::Aes256Gcm, &key1, b"hello", b"aad").unwrap();
        let result = decrypt(Algorithm::Aes256Gcm, &key2, &nonce, &ciphertext, b"aad");
        assert!(result.is_err());
    }

    #[test]
    fn nonces_are_unique_across_many_encryptions() {
        let key = generate_key();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10_000 {
            let (nonce, _) = encrypt(Algorithm::Aes256Gcm, &key, b"x", b"").unwrap();
            assert!(seen.insert(nonce), "nonce collision observed in 10k samples");
        }
    }

    #[test]
    fn rejects_short_nonce_on_decrypt() {
        let key = generate_key();
        let result = decrypt(Algorithm::Aes256Gcm, &key, b"short", b"ciphertext", b"aad");
        assert!(matches!(result, Err(CryptoError::InvalidNonceLength { .. })));
    }

    #[test]
    fn algorithm_parses_from_str() {
        assert_eq!("aes-256-gcm".parse::<Algorithm>().unwrap(), Algorithm::Aes256Gcm);
        assert_eq!(
            "chacha20-poly1305".parse::<Algorithm>().unwrap(),
            Algorithm::ChaCha20Poly1305
        );
        assert!("rot13".parse::<Algorithm>().is_err());
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_roundtrip_arbitrary_plaintext_aes_gcm(
            plaintext in proptest::collection::vec(any::<u8>(), 0..2048),
            aad in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let key = generate_key();
            let (nonce, ciphertext) = encrypt(Algorithm::Aes256Gcm, &key, &plaintext, &aad).unwrap();
            let decrypted = decrypt(Algorithm::Aes256Gcm, &key, &nonce, &ciphertext, &aad).unwrap();
            prop_assert_eq!(decrypted, plaintext);
        }

        #[test]
        fn prop_roundtrip_arbitrary_plaintext_chacha20(
            plaintext in proptest::collection::vec(any::<u8>(), 0..2048),
            aad in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let key = generate_key();
            let (nonce, ciphertext) = encrypt(Algorithm::ChaCha20Poly1305, &key, &plaintext, &aad).unwrap();
            let decrypted = decrypt(Algorithm::ChaCha20Poly1305, &key, &nonce, &ciphertext, &aad).unwrap();
            prop_assert_eq!(decrypted, plaintext);
        }

        #[test]
        fn prop_single_bit_flip_in_aad_never_decrypts(
            plaintext in proptest::collection::vec(any::<u8>(), 1..256),
            aad in proptest::collection::vec(any::<u8>(), 1..32),
            flip_index in 0usize..32,
        ) {
            let key = generate_key();
            let (nonce, ciphertext) = encrypt(Algorithm::Aes256Gcm, &key, &plaintext, &aad).unwrap();
            let mut bad_aad = aad.clone();
            let idx = flip_index % bad_aad.len();
            bad_aad[idx] ^= 0x01;
            prop_assert!(decrypt(Algorithm::Aes256Gcm, &key, &nonce, &ciphertext, &bad_aad).is_err());
        }
    }
}
