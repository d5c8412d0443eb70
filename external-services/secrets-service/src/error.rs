//! The crate-wide error taxonomy (§7): every public operation on every
//! engine returns `CoreResult<T>`. Narrower errors from the crates this
//! one composes (`crypto::CryptoError`, `crypto::KmsError`,
//! `audit_engine::AuditError`, `sqlx::Error`) convert into one of these
//! kinds; none of them carry key, ciphertext, or plaintext bytes in their
//! `Display` output.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("KMS operation failed: {0}")]
    Kms(String),

    #[error("audit log integrity violation: {0}")]
    Integrity(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("transient I/O failure, safe to retry: {0}")]
    Transient(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<crypto::CryptoError> for CoreError {
    fn from(e: crypto::CryptoError) -> Self {
        CoreError::Crypto(e.to_string())
    }
}

impl From<crypto::KmsError> for CoreError {
    fn from(e: crypto::KmsError) -> Self {
        CoreError::Kms(e.to_string())
    }
}

impl From<audit_engine::AuditError> for CoreError {
    fn from(e: audit_engine::AuditError) -> Self {
        match e {
            audit_engine::AuditError::Integrity(msg) => CoreError::Integrity(msg),
            audit_engine::AuditError::Validation(msg) => CoreError::Validation(msg),
            audit_engine::AuditError::NoActiveKek => {
                CoreError::Conflict("no active KEK is available to sign audit entries".to_string())
            }
            other => CoreError::Transient(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => CoreError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                CoreError::Conflict("unique constraint violated".to_string())
            }
            _ => CoreError::Transient(format!("database error: {e}")),
        }
    }
}

/// Raised when an operation needs the chain's active KEK but none is
/// marked active (§4.4: `unwrap` still builds the chain with no active
/// row, but anything needing `active_kek_id` must fail).
pub fn no_active_kek() -> CoreError {
    CoreError::Conflict("no active KEK is configured".to_string())
}
