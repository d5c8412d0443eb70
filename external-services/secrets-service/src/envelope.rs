//! Shared wrap/unwrap convention for key material one tier wraps the next
//! (master → KEK, KEK → DEK): `nonce(12) || ciphertext_with_tag`, the same
//! nonce-prefix shape `crypto::kms::LocalKeeper` uses for its own wrapping.
//! Both [`crate::kek`] and [`crate::dek`] call through this one place so
//! the on-disk shape of `wrapped_material` never drifts between them.

use crate::error::{CoreError, CoreResult};
use crypto::{aead, Algorithm};

/// Wrap 32 bytes of key material under `wrapping_key`, binding `aad`.
pub fn wrap(algorithm: Algorithm, wrapping_key: &[u8; 32], material: &[u8; 32], aad: &[u8]) -> CoreResult<Vec<u8>> {
    let (nonce, ciphertext) = aead::encrypt(algorithm, wrapping_key, material, aad)?;
    let mut out = Vec::with_capacity(nonce.len() + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Unwrap key material previously produced by [`wrap`], verifying `aad`.
pub fn unwrap(algorithm: Algorithm, wrapping_key: &[u8; 32], wrapped: &[u8], aad: &[u8]) -> CoreResult<[u8; 32]> {
    if wrapped.len() < aead::NONCE_LEN {
        return Err(CoreError::Crypto("wrapped material shorter than a nonce".to_string()));
    }
    let (nonce, ciphertext) = wrapped.split_at(aead::NONCE_LEN);
    let plaintext = aead::decrypt(algorithm, wrapping_key, nonce, ciphertext, aad)?;
    if plaintext.len() != 32 {
        return Err(CoreError::Crypto(format!("unwrapped material had length {}, expected 32", plaintext.len())));
    }
    let mut material = [0u8; 32];
    material.copy_from_slice(&plaintext);
    Ok(material)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_then_unwrap_roundtrips() {
        let wrapping_key = aead::generate_key();
        let material = aead::generate_key();
        let wrapped = wrap(Algorithm::Aes256Gcm, &wrapping_key, &material, b"aad").unwrap();
        let unwrapped = unwrap(Algorithm::Aes256Gcm, &wrapping_key, &wrapped, b"aad").unwrap();
        assert_eq!(unwrapped, material);
    }

    #[test]
    fn wrong_aad_fails() {
        let wrapping_key = aead::generate_key();
        let material = aead::generate_key();
        let wrapped = wrap(Algorithm::Aes256Gcm, &wrapping_key, &material, b"aad-1").unwrap();
        assert!(unwrap(Algorithm::Aes256Gcm, &wrapping_key, &wrapped, b"aad-2").is_err());
    }
}
