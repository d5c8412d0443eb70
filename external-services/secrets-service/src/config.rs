//! Typed startup configuration (§6, §10.3). Every setting is read once
//! from the environment into this struct and validated eagerly —
//! `validate()` fails fast the same way I3's KMS check does, rather than
//! surfacing a missing variable lazily on first use deep in a request.

use crate::error::{CoreError, CoreResult};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Ordered `(id, base64(kms-ciphertext))` pairs parsed from `MASTER_KEYS`.
    pub master_keys: Vec<(String, String)>,
    pub active_master_key_id: String,
    pub kms_provider: String,
    pub kms_key_uri: String,

    pub db_driver: String,
    pub db_connection_string: String,

    /// Batch size for `DekManager::rewrap_batch` when not overridden by the
    /// caller.
    pub rewrap_batch_size: u32,
    /// Default retention window, in days, for `cleanup_expired`/audit
    /// `delete_older_than` when not overridden by the caller.
    pub retention_days: i64,
    /// Bounded retry count for `ConflictError` retries (§7) on concurrent
    /// secret-version inserts and token-string collisions.
    pub conflict_retry_attempts: u32,
    /// Capacity and TTL for the read-through DEK cache (§10.3).
    pub dek_cache_capacity: u64,
    pub dek_cache_ttl: Duration,
}

impl Config {
    /// Loads from the process environment. `dotenvy::dotenv()` is
    /// attempted first and is a no-op if no `.env` file is present,
    /// matching local-development conventions elsewhere in the stack.
    pub fn load() -> CoreResult<Self> {
        let _ = dotenvy::dotenv();

        let master_keys = parse_master_keys(&env_required("MASTER_KEYS")?)?;
        let active_master_key_id = env_required("ACTIVE_MASTER_KEY_ID")?;
        let kms_provider = env_required("KMS_PROVIDER")?;
        let kms_key_uri = env_required("KMS_KEY_URI")?;
        let db_driver = std::env::var("DB_DRIVER").unwrap_or_else(|_| "postgres".to_string());
        let db_connection_string = env_required("DB_CONNECTION_STRING")?;

        let config = Self {
            master_keys,
            active_master_key_id,
            kms_provider,
            kms_key_uri,
            db_driver,
            db_connection_string,
            rewrap_batch_size: env_u32("REWRAP_BATCH_SIZE", 500)?,
            retention_days: env_i64("AUDIT_RETENTION_DAYS", 365)?,
            conflict_retry_attempts: env_u32("CONFLICT_RETRY_ATTEMPTS", 5)?,
            dek_cache_capacity: env_u32("DEK_CACHE_CAPACITY", 10_000)? as u64,
            dek_cache_ttl: Duration::from_secs(env_u32("DEK_CACHE_TTL_SECONDS", 300)? as u64),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.master_keys.is_empty() {
            return Err(CoreError::Config("MASTER_KEYS must contain at least one entry".to_string()));
        }
        if !self.master_keys.iter().any(|(id, _)| id == &self.active_master_key_id) {
            return Err(CoreError::Config(format!(
                "ACTIVE_MASTER_KEY_ID '{}' not present in MASTER_KEYS",
                self.active_master_key_id
            )));
        }
        if self.kms_provider.is_empty() || self.kms_key_uri.is_empty() {
            return Err(CoreError::Config("KMS_PROVIDER and KMS_KEY_URI are both required".to_string()));
        }
        if self.db_connection_string.is_empty() {
            return Err(CoreError::Config("DB_CONNECTION_STRING is required".to_string()));
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn minimal_for_test() -> Self {
        Self {
            master_keys: Vec::new(),
            active_master_key_id: String::new(),
            kms_provider: "local".to_string(),
            kms_key_uri: "local://test".to_string(),
            db_driver: "postgres".to_string(),
            db_connection_string: "postgres://localhost/test".to_string(),
            rewrap_batch_size: 500,
            retention_days: 365,
            conflict_retry_attempts: 5,
            dek_cache_capacity: 1_000,
            dek_cache_ttl: Duration::from_secs(60),
        }
    }
}

fn env_required(name: &str) -> CoreResult<String> {
    std::env::var(name).map_err(|_| CoreError::Config(format!("{name} is required but not set")))
}

fn env_u32(name: &str, default: u32) -> CoreResult<u32> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| CoreError::Config(format!("{name} must be a non-negative integer"))),
        Err(_) => Ok(default),
    }
}

fn env_i64(name: &str, default: i64) -> CoreResult<i64> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| CoreError::Config(format!("{name} must be an integer"))),
        Err(_) => Ok(default),
    }
}

/// Parses `id1:b64_1,id2:b64_2,...` preserving order, per §4.3 step 1.
fn parse_master_keys(raw: &str) -> CoreResult<Vec<(String, String)>> {
    raw.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| {
            let (id, b64) = entry.split_once(':').ok_or_else(|| {
                CoreError::Config(format!("MASTER_KEYS entry '{entry}' is not of the form id:base64"))
            })?;
            if id.is_empty() {
                return Err(CoreError::Config("MASTER_KEYS entry has an empty id".to_string()));
            }
            Ok((id.to_string(), b64.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ordered_master_key_list() {
        let parsed = parse_master_keys("m1:YWJj,m2:ZGVm").unwrap();
        assert_eq!(parsed, vec![("m1".to_string(), "YWJj".to_string()), ("m2".to_string(), "ZGVm".to_string())]);
    }

    #[test]
    fn rejects_malformed_entry() {
        assert!(parse_master_keys("m1-no-colon").is_err());
    }

    #[test]
    fn validate_rejects_unresolved_active_id() {
        let mut config = Config::minimal_for_test();
        config.master_keys = vec![("m1".to_string(), "YWJj".to_string())];
        config.active_master_key_id = "m2".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_passes_with_consistent_fields() {
        let mut config = Config::minimal_for_test();
        config.master_keys = vec![("m1".to_string(), "YWJj".to_string())];
        config.active_master_key_id = "m1".to_string();
        assert!(config.validate().is_ok());
    }
}
