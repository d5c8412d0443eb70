//! Postgres-backed `secret` table access. `(path, version)` is unique;
//! concurrent writers racing on the same path surface as `ConflictError`
//! via `CoreError::from(sqlx::Error)`'s unique-violation mapping (§4.6).

use crate::error::CoreResult;
use crate::model::Secret;
use crate::secrets::SecretRepository;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PostgresSecretRepository {
    pool: PgPool,
}

impl PostgresSecretRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SecretRepository for PostgresSecretRepository {
    async fn dek_for_path(&self, path: &str) -> CoreResult<Option<Uuid>> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT dek_id FROM secret WHERE path = $1 LIMIT 1")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id,)| id))
    }

    async fn max_version(&self, path: &str) -> CoreResult<Option<i64>> {
        let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(version) FROM secret WHERE path = $1")
            .bind(path)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    async fn insert(&self, secret: Secret) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO secret (id, path, version, dek_id, ciphertext, nonce, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(secret.id)
        .bind(&secret.path)
        .bind(secret.version)
        .bind(secret.dek_id)
        .bind(&secret.ciphertext)
        .bind(&secret.nonce)
        .bind(secret.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest(&self, path: &str) -> CoreResult<Option<Secret>> {
        let row = sqlx::query_as::<_, Secret>(
            "SELECT id, path, version, dek_id, ciphertext, nonce, created_at FROM secret \
             WHERE path = $1 ORDER BY version DESC LIMIT 1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn by_version(&self, path: &str, version: i64) -> CoreResult<Option<Secret>> {
        let row = sqlx::query_as::<_, Secret>(
            "SELECT id, path, version, dek_id, ciphertext, nonce, created_at FROM secret \
             WHERE path = $1 AND version = $2",
        )
        .bind(path)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_by_path(&self, path: &str) -> CoreResult<Option<Uuid>> {
        let dek_id = self.dek_for_path(path).await?;
        sqlx::query("DELETE FROM secret WHERE path = $1").bind(path).execute(&self.pool).await?;
        Ok(dek_id)
    }
}
