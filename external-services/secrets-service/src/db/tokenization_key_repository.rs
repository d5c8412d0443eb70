//! Postgres-backed `tokenization_key` table access; mirrors
//! [`super::transit_key_repository::PostgresTransitKeyRepository`]'s
//! name/version lookup shape with the extra `format_type`/`is_deterministic`
//! columns.

use crate::error::CoreResult;
use crate::model::TokenizationKey;
use crate::tokenization::TokenizationKeyRepository;
use async_trait::async_trait;
use sqlx::PgPool;

#[derive(Clone)]
pub struct PostgresTokenizationKeyRepository {
    pool: PgPool,
}

impl PostgresTokenizationKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenizationKeyRepository for PostgresTokenizationKeyRepository {
    async fn latest(&self, name: &str) -> CoreResult<Option<TokenizationKey>> {
        let row = sqlx::query_as::<_, TokenizationKey>(
            "SELECT id, name, version, dek_id, format_type, is_deterministic, algorithm, created_at \
             FROM tokenization_key WHERE name = $1 ORDER BY version DESC LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn by_version(&self, name: &str, version: i64) -> CoreResult<Option<TokenizationKey>> {
        let row = sqlx::query_as::<_, TokenizationKey>(
            "SELECT id, name, version, dek_id, format_type, is_deterministic, algorithm, created_at \
             FROM tokenization_key WHERE name = $1 AND version = $2",
        )
        .bind(name)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert(&self, key: TokenizationKey) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO tokenization_key (id, name, version, dek_id, format_type, is_deterministic, algorithm, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(key.id)
        .bind(&key.name)
        .bind(key.version)
        .bind(key.dek_id)
        .bind(key.format_type.as_str())
        .bind(key.is_deterministic)
        .bind(key.algorithm.as_str())
        .bind(key.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
