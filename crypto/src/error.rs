use thiserror::Error;

/// Errors from the AEAD primitives and key-derivation layer (§4.1, §4.3 I4).
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed: authentication tag mismatch")]
    DecryptionFailed,

    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("invalid nonce length: expected {expected}, got {got}")]
    InvalidNonceLength { expected: usize, got: usize },

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid encrypted data format: {0}")]
    InvalidFormat(String),

    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors from the KMS adapter (§4.2). Never carries key material.
#[derive(Error, Debug)]
pub enum KmsError {
    #[error("failed to open keeper for {uri}: {reason}")]
    Open { uri: String, reason: String },

    #[error("KMS encrypt operation failed: {0}")]
    Encrypt(String),

    #[error("KMS decrypt operation failed: {0}")]
    Decrypt(String),

    #[error("keeper is closed")]
    Closed,
}

pub type KmsResult<T> = Result<T, KmsError>;
