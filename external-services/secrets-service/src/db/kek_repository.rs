//! Postgres-backed `kek` table access (§6 persistence layout). `rotate`
//! performs the I5 active-flip inside one `SERIALIZABLE` transaction —
//! this store has no partial unique index to lean on, so the transaction
//! isolation level is what actually enforces at-most-one-active (§9).

use crate::error::CoreResult;
use crate::kek::KekRepository;
use crate::model::Kek;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct PostgresKekRepository {
    pool: PgPool,
}

impl PostgresKekRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_tx(tx: &mut Transaction<'_, Postgres>, kek: &Kek) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO kek (id, algorithm, is_active, master_key_id, wrapped_material, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(kek.id)
        .bind(kek.algorithm.as_str())
        .bind(kek.is_active)
        .bind(&kek.master_key_id)
        .bind(&kek.wrapped_material)
        .bind(kek.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl KekRepository for PostgresKekRepository {
    async fn list_all(&self) -> CoreResult<Vec<Kek>> {
        let rows = sqlx::query_as::<_, Kek>(
            "SELECT id, algorithm, is_active, master_key_id, wrapped_material, created_at FROM kek ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_active(&self) -> CoreResult<Option<Kek>> {
        let row = sqlx::query_as::<_, Kek>(
            "SELECT id, algorithm, is_active, master_key_id, wrapped_material, created_at FROM kek WHERE is_active LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert(&self, kek: Kek) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_tx(&mut tx, &kek).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn mark_inactive(&self, id: Uuid) -> CoreResult<()> {
        sqlx::query("UPDATE kek SET is_active = false WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn rotate(&self, old_active: Option<Uuid>, new_kek: Kek) -> CoreResult<()> {
        debug!(new_kek_id = %new_kek.id, ?old_active, "rotating active KEK");
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE").execute(&mut *tx).await?;

        if let Some(old_id) = old_active {
            sqlx::query("UPDATE kek SET is_active = false WHERE id = $1").bind(old_id).execute(&mut *tx).await?;
        }
        Self::insert_tx(&mut tx, &new_kek).await?;

        tx.commit().await?;
        Ok(())
    }
}
