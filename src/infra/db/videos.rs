use async_trait::async_trait;
use sqlx::{query_as, query_scalar};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{RepoError, VideosRepo},
    domain::entities::VideoRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct VideoRow {
    id: Uuid,
    channel_id: Uuid,
    title: String,
    views: i64,
    created_at: OffsetDateTime,
}

impl From<VideoRow> for VideoRecord {
    fn from(row: VideoRow) -> Self {
        Self {
            id: row.id,
            channel_id: row.channel_id,
            title: row.title,
            views: row.views,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl VideosRepo for PostgresRepositories {
    async fn find_video(&self, id: Uuid) -> Result<Option<VideoRecord>, RepoError> {
        let row = query_as::<_, VideoRow>(
            r#"
            SELECT id, channel_id, title, views, created_at
              FROM videos
             WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn add_views(&self, id: Uuid, delta: i64) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let updated = query_scalar::<_, Uuid>(
            r#"
            UPDATE videos
               SET views = views + $2
             WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(tx.as_mut())
        .await
        .map_err(map_sqlx_error)?;

        if updated.is_none() {
            return Err(RepoError::NotFound);
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(())
    }
}
