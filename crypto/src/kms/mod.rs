//! KMS adapter (§4.2): one operation, `open_keeper(uri)`, behind which the
//! core never looks — a `Keeper` only ever encrypts and decrypts opaque
//! byte strings. Master-key material is the only thing ever passed through
//! this layer; the core does not inspect what a Keeper returns.

pub mod local;

#[cfg(feature = "aws-kms")]
pub mod aws;

#[cfg(feature = "vault-kms")]
pub mod vault;

use crate::error::{KmsError, KmsResult};
use async_trait::async_trait;

pub use local::LocalKeeper;

#[cfg(feature = "aws-kms")]
pub use aws::AwsKeeper;

#[cfg(feature = "vault-kms")]
pub use vault::VaultKeeper;

/// A KMS-backed key encryptor/decryptor, opened once for a URI and reused
/// for the lifetime of the process (or a rotation step).
#[async_trait]
pub trait Keeper: Send + Sync {
    async fn encrypt(&self, plaintext: &[u8]) -> KmsResult<Vec<u8>>;
    async fn decrypt(&self, ciphertext: &[u8]) -> KmsResult<Vec<u8>>;
    async fn close(&self) -> KmsResult<()>;
}

/// Open a `Keeper` for a `KMS_KEY_URI`. Recognized schemes:
/// - `local://<base64 32-byte key>` — symmetric key baked into the URI, for
///   tests and local development.
/// - `awskms://<region>/<key-id>` — AWS KMS (requires the `aws-kms` feature).
/// - `hashivault://<addr>/<mount>/<key-name>` — HashiCorp Vault Transit
///   (requires the `vault-kms` feature).
/// - `gcpkms://…`, `azurekeyvault://…` — recognized but not compiled into
///   this build; see DESIGN.md.
pub async fn open_keeper(uri: &str) -> KmsResult<Box<dyn Keeper>> {
    let scheme_end = uri.find("://").ok_or_else(|| KmsError::Open {
        uri: uri.to_string(),
        reason: "missing scheme, expected scheme://...".to_string(),
    })?;
    let scheme = &uri[..scheme_end];
    let rest = &uri[scheme_end + 3..];

    match scheme {
        "local" => Ok(Box::new(LocalKeeper::from_uri(rest)?)),
        #[cfg(feature = "aws-kms")]
        "awskms" => Ok(Box::new(AwsKeeper::from_uri(rest).await?)),
        #[cfg(not(feature = "aws-kms"))]
        "awskms" => Err(KmsError::Open {
            uri: uri.to_string(),
            reason: "aws-kms feature not enabled in this build".to_string(),
        }),
        #[cfg(feature = "vault-kms")]
        "hashivault" => Ok(Box::new(VaultKeeper::from_uri(rest)?)),
        #[cfg(not(feature = "vault-kms"))]
        "hashivault" => Err(KmsError::Open {
            uri: uri.to_string(),
            reason: "vault-kms feature not enabled in this build".to_string(),
        }),
        "gcpkms" | "azurekeyvault" => Err(KmsError::Open {
            uri: uri.to_string(),
            reason: format!("provider '{scheme}' is not compiled into this build"),
        }),
        other => Err(KmsError::Open {
            uri: uri.to_string(),
            reason: format!("unrecognized KMS provider scheme '{other}'"),
        }),
    }
}
