//! Postgres-backed `transit_key` table access. `(name, version)` is
//! unique; rotation relies on that constraint to prevent two writers
//! from issuing the same next version concurrently.

use crate::error::CoreResult;
use crate::model::TransitKey;
use crate::transit::TransitKeyRepository;
use async_trait::async_trait;
use sqlx::PgPool;

#[derive(Clone)]
pub struct PostgresTransitKeyRepository {
    pool: PgPool,
}

impl PostgresTransitKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransitKeyRepository for PostgresTransitKeyRepository {
    async fn latest(&self, name: &str) -> CoreResult<Option<TransitKey>> {
        let row = sqlx::query_as::<_, TransitKey>(
            "SELECT id, name, version, dek_id, algorithm, created_at FROM transit_key \
             WHERE name = $1 ORDER BY version DESC LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn by_version(&self, name: &str, version: i64) -> CoreResult<Option<TransitKey>> {
        let row = sqlx::query_as::<_, TransitKey>(
            "SELECT id, name, version, dek_id, algorithm, created_at FROM transit_key \
             WHERE name = $1 AND version = $2",
        )
        .bind(name)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert(&self, key: TransitKey) -> CoreResult<()> {
        sqlx::query("INSERT INTO transit_key (id, name, version, dek_id, algorithm, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(key.id)
            .bind(&key.name)
            .bind(key.version)
            .bind(key.dek_id)
            .bind(key.algorithm.as_str())
            .bind(key.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
