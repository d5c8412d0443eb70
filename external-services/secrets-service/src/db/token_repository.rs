//! Postgres-backed `token` table access. `(tokenization_key_id,
//! plaintext_hash) WHERE plaintext_hash IS NOT NULL` is the unique index
//! deterministic tokenization leans on for idempotent lookup.

use crate::error::CoreResult;
use crate::model::Token;
use crate::tokenization::TokenRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PostgresTokenRepository {
    pool: PgPool,
}

impl PostgresTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for PostgresTokenRepository {
    async fn get(&self, token: &str) -> CoreResult<Option<Token>> {
        let row = sqlx::query_as::<_, Token>(
            "SELECT token, tokenization_key_id, version, ciphertext, nonce, plaintext_hash, expires_at, created_at \
             FROM token WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_plaintext_hash(&self, tokenization_key_id: Uuid, plaintext_hash: &[u8]) -> CoreResult<Option<Token>> {
        let row = sqlx::query_as::<_, Token>(
            "SELECT token, tokenization_key_id, version, ciphertext, nonce, plaintext_hash, expires_at, created_at \
             FROM token WHERE tokenization_key_id = $1 AND plaintext_hash = $2",
        )
        .bind(tokenization_key_id)
        .bind(plaintext_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert(&self, token: Token) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO token (token, tokenization_key_id, version, ciphertext, nonce, plaintext_hash, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&token.token)
        .bind(token.tokenization_key_id)
        .bind(token.version)
        .bind(&token.ciphertext)
        .bind(&token.nonce)
        .bind(&token.plaintext_hash)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>, dry_run: bool) -> CoreResult<u64> {
        if dry_run {
            let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM token WHERE expires_at IS NOT NULL AND expires_at < $1")
                .bind(cutoff)
                .fetch_one(&self.pool)
                .await?;
            return Ok(row.0 as u64);
        }
        let result = sqlx::query("DELETE FROM token WHERE expires_at IS NOT NULL AND expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
