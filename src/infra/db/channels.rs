use async_trait::async_trait;
use sqlx::query_as;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{ChannelsRepo, RepoError},
    domain::entities::ChannelRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ChannelRow {
    id: Uuid,
    username: String,
    created_at: OffsetDateTime,
}

impl From<ChannelRow> for ChannelRecord {
    fn from(row: ChannelRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl ChannelsRepo for PostgresRepositories {
    async fn find_channel(&self, id: Uuid) -> Result<Option<ChannelRecord>, RepoError> {
        let row = query_as::<_, ChannelRow>(
            r#"
            SELECT id, username, created_at
              FROM channels
             WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }
}
