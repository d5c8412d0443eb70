//! AWS KMS provider for the KMS adapter (§4.2). URI form:
//! `awskms://<region>/<key-id>`.

use super::Keeper;
use crate::error::{KmsError, KmsResult};
use async_trait::async_trait;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::Client as KmsClient;

pub struct AwsKeeper {
    client: KmsClient,
    key_id: String,
}

impl AwsKeeper {
    pub async fn from_uri(rest: &str) -> KmsResult<Self> {
        let mut parts = rest.splitn(2, '/');
        let region = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| KmsError::Open {
            uri: format!("awskms://{rest}"),
            reason: "expected awskms://<region>/<key-id>".to_string(),
        })?;
        let key_id = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| KmsError::Open {
            uri: format!("awskms://{rest}"),
            reason: "missing key-id segment".to_string(),
        })?;

        let config = aws_config::from_env()
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        let client = KmsClient::new(&config);

        Ok(Self {
            client,
            key_id: key_id.to_string(),
        })
    }
}

#[async_trait]
impl Keeper for AwsKeeper {
    async fn encrypt(&self, plaintext: &[u8]) -> KmsResult<Vec<u8>> {
        let response = self
            .client
            .encrypt()
            .key_id(&self.key_id)
            .plaintext(Blob::new(plaintext))
            .send()
            .await
            .map_err(|e| KmsError::Encrypt(e.to_string()))?;

        response
            .ciphertext_blob()
            .map(|b| b.as_ref().to_vec())
            .ok_or_else(|| KmsError::Encrypt("AWS KMS response carried no ciphertext".to_string()))
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> KmsResult<Vec<u8>> {
        let response = self
            .client
            .decrypt()
            .key_id(&self.key_id)
            .ciphertext_blob(Blob::new(ciphertext))
            .send()
            .await
            .map_err(|e| KmsError::Decrypt(e.to_string()))?;

        response
            .plaintext()
            .map(|b| b.as_ref().to_vec())
            .ok_or_else(|| KmsError::Decrypt("AWS KMS response carried no plaintext".to_string()))
    }

    async fn close(&self) -> KmsResult<()> {
        Ok(())
    }
}
