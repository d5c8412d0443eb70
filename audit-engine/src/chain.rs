//! The audit log chain itself (§4.9): append signs every row with a key
//! derived from the KEK active at write time; `verify_batch` re-derives
//! and compares signatures in constant time, never trusting the stored
//! bit without recomputation.

use crate::entry::AuditLog;
use crate::error::{AuditError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crypto::constant_time::ct_eq;
use crypto::kdf::Kdf;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;
use zeroize::Zeroizing;

const SIGNING_INFO: &[u8] = b"audit-sign";

/// Supplies the audit chain with the key material it needs to sign and
/// verify, without ever exposing the KEK chain itself. Implemented by the
/// core service over its `KekChain`.
#[async_trait]
pub trait SigningKeySource: Send + Sync {
    /// The id of the KEK that is active right now, for the `signing_kek_id`
    /// stamped onto new rows.
    async fn active_kek_id(&self) -> Result<Uuid>;

    /// Unwrapped material for `kek_id`, used to derive the per-entry HMAC
    /// key. Never retained by the caller past this call.
    async fn kek_material(&self, kek_id: Uuid) -> Result<Zeroizing<[u8; 32]>>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn insert(&self, row: AuditLog) -> Result<()>;
    async fn range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<AuditLog>>;
    async fn delete_older_than(&self, cutoff: DateTime<Utc>, dry_run: bool) -> Result<u64>;
}

/// The result of `verify_batch` (§8 invariant 6, §4.9 verify path).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VerificationReport {
    pub total: usize,
    pub signed: usize,
    pub unsigned: usize,
    pub valid: usize,
    pub invalid: usize,
    pub invalid_ids: Vec<Uuid>,
}

pub struct AuditChain {
    repo: Arc<dyn AuditRepository>,
    keys: Arc<dyn SigningKeySource>,
}

impl AuditChain {
    pub fn new(repo: Arc<dyn AuditRepository>, keys: Arc<dyn SigningKeySource>) -> Self {
        Self { repo, keys }
    }

    fn derive_signing_key(kek_id: Uuid, kek_material: &[u8; 32]) -> Result<Zeroizing<Vec<u8>>> {
        Kdf::hkdf(kek_material, kek_id.as_bytes(), SIGNING_INFO, 32).map_err(AuditError::from)
    }

    /// Signs and persists a new row. `metadata` is opaque JSON; it is
    /// canonicalized (sorted keys, no whitespace) before being signed.
    pub async fn append(
        &self,
        client_id: impl Into<String>,
        action: impl Into<String>,
        resource_path: impl Into<String>,
        success: bool,
        metadata: Value,
    ) -> Result<AuditLog> {
        let kek_id = self.keys.active_kek_id().await?;
        let kek_material = self.keys.kek_material(kek_id).await?;
        let signing_key = Self::derive_signing_key(kek_id, &kek_material)?;

        let mut row = AuditLog {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            client_id: client_id.into(),
            action: action.into(),
            resource_path: resource_path.into(),
            success,
            metadata,
            signature: None,
            signing_kek_id: Some(kek_id),
        };

        let tag = Kdf::hmac_sha256(&signing_key, &row.canonical_bytes())?;
        row.signature = Some(tag);

        self.repo.insert(row.clone()).await?;
        Ok(row)
    }

    /// Re-derives every signed row's signature against the KEK that signed
    /// it and compares in constant time (§4.9 verify path, §8 invariant 6).
    pub async fn verify_batch(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<VerificationReport> {
        let rows = self.repo.range(start, end).await?;

        let mut report = VerificationReport {
            total: rows.len(),
            signed: 0,
            unsigned: 0,
            valid: 0,
            invalid: 0,
            invalid_ids: Vec::new(),
        };

        for row in &rows {
            let (Some(signature), Some(kek_id)) = (row.signature, row.signing_kek_id) else {
                report.unsigned += 1;
                continue;
            };
            report.signed += 1;

            let kek_material = self.keys.kek_material(kek_id).await?;
            let signing_key = Self::derive_signing_key(kek_id, &kek_material)?;
            let expected = Kdf::hmac_sha256(&signing_key, &row.canonical_bytes())?;

            if ct_eq(&expected, &signature) {
                report.valid += 1;
            } else {
                report.invalid += 1;
                report.invalid_ids.push(row.id);
            }
        }

        Ok(report)
    }

    /// Retention is unconditional: it does not consult signature state.
    pub async fn delete_older_than(&self, days: i64, dry_run: bool) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        self.repo.delete_older_than(cutoff, dry_run).await
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod fakes {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    pub struct InMemoryAuditRepository {
        rows: Mutex<HashMap<Uuid, AuditLog>>,
    }

    impl Default for InMemoryAuditRepository {
        fn default() -> Self {
            Self { rows: Mutex::new(HashMap::new()) }
        }
    }

    #[async_trait]
    impl AuditRepository for InMemoryAuditRepository {
        async fn insert(&self, row: AuditLog) -> Result<()> {
            self.rows.lock().await.insert(row.id, row);
            Ok(())
        }

        async fn range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<AuditLog>> {
            let mut rows: Vec<AuditLog> = self
                .rows
                .lock()
                .await
                .values()
                .filter(|r| r.timestamp >= start && r.timestamp <= end)
                .cloned()
                .collect();
            rows.sort_by_key(|r| r.timestamp);
            Ok(rows)
        }

        async fn delete_older_than(&self, cutoff: DateTime<Utc>, dry_run: bool) -> Result<u64> {
            let mut rows = self.rows.lock().await;
            let stale: Vec<Uuid> = rows.values().filter(|r| r.timestamp < cutoff).map(|r| r.id).collect();
            if !dry_run {
                for id in &stale {
                    rows.remove(id);
                }
            }
            Ok(stale.len() as u64)
        }
    }

    impl InMemoryAuditRepository {
        pub async fn corrupt(&self, id: Uuid, metadata: Value) {
            if let Some(row) = self.rows.lock().await.get_mut(&id) {
                row.metadata = metadata;
            }
        }
    }

    pub struct SingleKekKeySource {
        pub kek_id: Uuid,
        pub material: [u8; 32],
    }

    #[async_trait]
    impl SigningKeySource for SingleKekKeySource {
        async fn active_kek_id(&self) -> Result<Uuid> {
            Ok(self.kek_id)
        }

        async fn kek_material(&self, kek_id: Uuid) -> Result<Zeroizing<[u8; 32]>> {
            if kek_id != self.kek_id {
                return Err(AuditError::Validation(format!("unknown kek {kek_id}")));
            }
            Ok(Zeroizing::new(self.material))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::{InMemoryAuditRepository, SingleKekKeySource};
    use super::*;

    fn chain() -> (AuditChain, Arc<InMemoryAuditRepository>) {
        let repo = Arc::new(InMemoryAuditRepository::default());
        let keys = Arc::new(SingleKekKeySource { kek_id: Uuid::new_v4(), material: [7u8; 32] });
        (AuditChain::new(repo.clone(), keys), repo)
    }

    #[tokio::test]
    async fn appended_rows_verify_clean() {
        let (chain, _repo) = chain();
        let start = Utc::now() - chrono::Duration::minutes(1);
        for i in 0..3 {
            chain
                .append("client-1", "secret.write", format!("/a/{i}"), true, serde_json::json!({"n": i}))
                .await
                .unwrap();
        }
        let end = Utc::now() + chrono::Duration::minutes(1);
        let report = chain.verify_batch(start, end).await.unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.signed, 3);
        assert_eq!(report.valid, 3);
        assert_eq!(report.invalid, 0);
    }

    #[tokio::test]
    async fn tampered_row_is_detected() {
        let (chain, repo) = chain();
        let start = Utc::now() - chrono::Duration::minutes(1);
        let mut last_id = Uuid::nil();
        for i in 0..3 {
            let row = chain
                .append("client-1", "secret.write", format!("/a/{i}"), true, serde_json::json!({"n": i}))
                .await
                .unwrap();
            if i == 1 {
                last_id = row.id;
            }
        }
        repo.corrupt(last_id, serde_json::json!({"n": 999})).await;

        let end = Utc::now() + chrono::Duration::minutes(1);
        let report = chain.verify_batch(start, end).await.unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.signed, 3);
        assert_eq!(report.valid, 2);
        assert_eq!(report.invalid, 1);
        assert_eq!(report.invalid_ids, vec![last_id]);
    }

    #[tokio::test]
    async fn unsigned_legacy_rows_count_separately() {
        let (chain, repo) = chain();
        let legacy = AuditLog {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            client_id: "legacy".to_string(),
            action: "secret.write".to_string(),
            resource_path: "/legacy".to_string(),
            success: true,
            metadata: serde_json::json!({}),
            signature: None,
            signing_kek_id: None,
        };
        repo.insert(legacy).await.unwrap();

        let start = Utc::now() - chrono::Duration::minutes(1);
        let end = Utc::now() + chrono::Duration::minutes(1);
        let report = chain.verify_batch(start, end).await.unwrap();
        assert_eq!(report.total, 1);
        assert_eq!(report.unsigned, 1);
        assert_eq!(report.signed, 0);
    }

    #[tokio::test]
    async fn retention_is_unconditional_of_signature_state() {
        let (chain, repo) = chain();
        chain
            .append("client-1", "secret.write", "/a", true, serde_json::json!({}))
            .await
            .unwrap();

        // Force the row to look old enough to be reaped regardless of sign state.
        let cutoff = Utc::now() + chrono::Duration::minutes(1);
        let deleted = repo.delete_older_than(cutoff, false).await.unwrap();
        assert_eq!(deleted, 1);

        let deleted_again = chain.delete_older_than(-1, true).await.unwrap();
        assert_eq!(deleted_again, 0);
    }
}
