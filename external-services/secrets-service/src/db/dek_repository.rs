//! Postgres-backed `dek` table access. `rewrap_page` pages through DEKs
//! still wrapped under a given KEK oldest-first so `DekManager::rewrap_batch`
//! can be looped to completion without loading the whole table (§4.10).

use crate::dek::DekRepository;
use crate::error::{CoreError, CoreResult};
use crate::model::Dek;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PostgresDekRepository {
    pool: PgPool,
}

impl PostgresDekRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DekRepository for PostgresDekRepository {
    async fn get(&self, id: Uuid) -> CoreResult<Dek> {
        sqlx::query_as::<_, Dek>("SELECT id, kek_id, algorithm, wrapped_material, created_at FROM dek WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("DEK {id} not found")))
    }

    async fn insert(&self, dek: Dek) -> CoreResult<()> {
        sqlx::query("INSERT INTO dek (id, kek_id, algorithm, wrapped_material, created_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(dek.id)
            .bind(dek.kek_id)
            .bind(dek.algorithm.as_str())
            .bind(&dek.wrapped_material)
            .bind(dek.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM dek WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn rewrap_page(&self, from_kek_id: Uuid, limit: u32) -> CoreResult<Vec<Dek>> {
        let rows = sqlx::query_as::<_, Dek>(
            "SELECT id, kek_id, algorithm, wrapped_material, created_at FROM dek \
             WHERE kek_id = $1 ORDER BY created_at ASC LIMIT $2",
        )
        .bind(from_kek_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update_wrapped(&self, id: Uuid, new_kek_id: Uuid, new_wrapped_material: Vec<u8>) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE dek SET kek_id = $1, wrapped_material = $2 WHERE id = $3")
            .bind(new_kek_id)
            .bind(&new_wrapped_material)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
