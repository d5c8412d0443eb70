//! HashiCorp Vault Transit provider for the KMS adapter (§4.2). URI form:
//! `hashivault://<addr>/<mount>/<key-name>`. The Vault token is read from
//! the `VAULT_TOKEN` environment variable — it never appears in the URI.

use super::Keeper;
use crate::error::{KmsError, KmsResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::time::Duration;
use zeroize::Zeroizing;

#[derive(Deserialize)]
struct VaultEncryptResponse {
    data: VaultEncryptData,
}

#[derive(Deserialize)]
struct VaultEncryptData {
    ciphertext: String,
}

#[derive(Deserialize)]
struct VaultDecryptResponse {
    data: VaultDecryptData,
}

#[derive(Deserialize)]
struct VaultDecryptData {
    plaintext: String,
}

pub struct VaultKeeper {
    client: reqwest::Client,
    vault_addr: String,
    vault_token: String,
    mount_path: String,
    key_name: String,
}

impl VaultKeeper {
    /// `rest` is the URI body after `hashivault://`: `<addr>/<mount>/<key-name>`.
    pub fn from_uri(rest: &str) -> KmsResult<Self> {
        let vault_token = std::env::var("VAULT_TOKEN").map_err(|_| KmsError::Open {
            uri: format!("hashivault://{rest}"),
            reason: "VAULT_TOKEN environment variable is not set".to_string(),
        })?;

        let mut parts = rest.splitn(3, '/');
        let addr = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| KmsError::Open {
            uri: format!("hashivault://{rest}"),
            reason: "expected hashivault://<addr>/<mount>/<key-name>".to_string(),
        })?;
        let mount = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| KmsError::Open {
            uri: format!("hashivault://{rest}"),
            reason: "missing mount path segment".to_string(),
        })?;
        let key_name = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| KmsError::Open {
            uri: format!("hashivault://{rest}"),
            reason: "missing key-name segment".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| KmsError::Open {
                uri: format!("hashivault://{rest}"),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            vault_addr: format!("https://{addr}"),
            vault_token,
            mount_path: mount.to_string(),
            key_name: key_name.to_string(),
        })
    }

    fn url(&self, action: &str) -> String {
        format!(
            "{}/v1/{}/{}/{}",
            self.vault_addr, self.mount_path, action, self.key_name
        )
    }
}

#[async_trait]
impl Keeper for VaultKeeper {
    async fn encrypt(&self, plaintext: &[u8]) -> KmsResult<Vec<u8>> {
        let body = serde_json::json!({ "plaintext": STANDARD.encode(plaintext) });

        let response = self
            .client
            .post(self.url("encrypt"))
            .header("X-Vault-Token", &self.vault_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| KmsError::Encrypt(e.to_string()))?;

        let parsed: VaultEncryptResponse = response
            .error_for_status()
            .map_err(|e| KmsError::Encrypt(e.to_string()))?
            .json()
            .await
            .map_err(|e| KmsError::Encrypt(format!("malformed Vault response: {e}")))?;

        Ok(parsed.data.ciphertext.into_bytes())
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> KmsResult<Vec<u8>> {
        let ciphertext_str = std::str::from_utf8(ciphertext)
            .map_err(|_| KmsError::Decrypt("ciphertext is not valid Vault token text".to_string()))?;

        let parts: Vec<&str> = ciphertext_str.splitn(3, ':').collect();
        if parts.len() < 3 || parts[0] != "vault" {
            return Err(KmsError::Decrypt(
                "ciphertext is not a recognized vault:v#:... token".to_string(),
            ));
        }

        let body = serde_json::json!({ "ciphertext": ciphertext_str });

        let response = self
            .client
            .post(self.url("decrypt"))
            .header("X-Vault-Token", &self.vault_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| KmsError::Decrypt(e.to_string()))?;

        let parsed: VaultDecryptResponse = response
            .error_for_status()
            .map_err(|e| KmsError::Decrypt(e.to_string()))?
            .json()
            .await
            .map_err(|e| KmsError::Decrypt(format!("malformed Vault response: {e}")))?;

        let plaintext = STANDARD
            .decode(parsed.data.plaintext)
            .map_err(|e| KmsError::Decrypt(format!("invalid base64 plaintext: {e}")))?;

        Ok(Zeroizing::new(plaintext).to_vec())
    }

    async fn close(&self) -> KmsResult<()> {
        Ok(())
    }
}
