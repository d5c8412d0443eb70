use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("audit entry failed validation: {0}")]
    Validation(String),

    #[error("audit storage operation failed: {0}")]
    Storage(String),

    #[error("no active KEK is available to sign audit entries")]
    NoActiveKek,

    #[error("audit log integrity violation: {0}")]
    Integrity(String),

    #[error(transparent)]
    Crypto(#[from] crypto::CryptoError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AuditError>;
