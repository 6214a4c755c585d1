use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{
        CreateItemParams, ItemsRepo, ItemsWriteRepo, RepoError, UpdateItemParams,
    },
    domain::entities::ItemRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    name: String,
    created_at: OffsetDateTime,
    user_id: String,
}

impl From<ItemRow> for ItemRecord {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            timestamp: row.created_at,
            user_id: row.user_id,
        }
    }
}

#[async_trait]
impl ItemsRepo for PostgresRepositories {
    async fn list_recent(&self, limit: u32) -> Result<Vec<ItemRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, name, created_at, user_id
            FROM items
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ItemRecord::from).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ItemRecord>, RepoError> {
        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, name, created_at, user_id
            FROM items
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ItemRecord::from))
    }

    async fn ping(&self) -> Result<(), RepoError> {
        sqlx::query("SELECT 1")
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl ItemsWriteRepo for PostgresRepositories {
    async fn create_item(&self, params: CreateItemParams) -> Result<ItemRecord, RepoError> {
        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            INSERT INTO items (id, name, user_id)
            VALUES ($1, $2, $3)
            RETURNING id, name, created_at, user_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&params.name)
        .bind(&params.user_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_item(
        &self,
        params: UpdateItemParams,
    ) -> Result<Option<ItemRecord>, RepoError> {
        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            UPDATE items
            SET name = $2
            WHERE id = $1
            RETURNING id, name, created_at, user_id
            "#,
        )
        .bind(params.id)
        .bind(&params.name)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ItemRecord::from))
    }

    async fn delete_item(&self, id: Uuid) -> Result<Option<ItemRecord>, RepoError> {
        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            DELETE FROM items
            WHERE id = $1
            RETURNING id, name, created_at, user_id
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ItemRecord::from))
    }
}

impl PostgresRepositories {
    /// Number of stored items; used by the live database tests.
    pub async fn count_items(&self) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        u64::try_from(count).map_err(|_| RepoError::from_persistence("count out of range"))
    }
}

