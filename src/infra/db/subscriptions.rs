use async_trait::async_trait;
use sqlx::{query, query_as, query_scalar};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{PageRequest, RepoError, SubscriptionsRepo},
    domain::entities::{SubscriberEntry, SubscriptionEntry},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct SubscriberRow {
    subscriber_id: Uuid,
    username: String,
    created_at: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    channel_id: Uuid,
    username: String,
    created_at: OffsetDateTime,
}

#[async_trait]
impl SubscriptionsRepo for PostgresRepositories {
    async fn edge_exists(
        &self,
        subscriber_id: Uuid,
        channel_id: Uuid,
    ) -> Result<bool, RepoError> {
        query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1
                  FROM subscriptions
                 WHERE subscriber_id = $1
                   AND channel_id = $2
            )
            "#,
        )
        .bind(subscriber_id)
        .bind(channel_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn create_edge(
        &self,
        subscriber_id: Uuid,
        channel_id: Uuid,
    ) -> Result<bool, RepoError> {
        // ON CONFLICT makes redelivered SUBSCRIBE messages a no-op; the
        // unique pair constraint is the only mutual exclusion needed.
        let result = query(
            r#"
            INSERT INTO subscriptions (id, subscriber_id, channel_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (subscriber_id, channel_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(subscriber_id)
        .bind(channel_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_edge(
        &self,
        subscriber_id: Uuid,
        channel_id: Uuid,
    ) -> Result<bool, RepoError> {
        let result = query(
            r#"
            DELETE FROM subscriptions
             WHERE subscriber_id = $1
               AND channel_id = $2
            "#,
        )
        .bind(subscriber_id)
        .bind(channel_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_subscribers(
        &self,
        channel_id: Uuid,
        page: PageRequest,
    ) -> Result<Vec<SubscriberEntry>, RepoError> {
        let rows = query_as::<_, SubscriberRow>(
            r#"
            SELECT s.subscriber_id, c.username, s.created_at
              FROM subscriptions s
             INNER JOIN channels c ON c.id = s.subscriber_id
             WHERE s.channel_id = $1
             ORDER BY s.created_at DESC, s.id DESC
             LIMIT $2 OFFSET $3
            "#,
        )
        .bind(channel_id)
        .bind(i64::from(page.limit))
        .bind(page.offset())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| SubscriberEntry {
                subscriber_id: row.subscriber_id,
                username: row.username,
                subscribed_at: row.created_at,
            })
            .collect())
    }

    async fn list_subscriptions(
        &self,
        subscriber_id: Uuid,
        page: PageRequest,
    ) -> Result<Vec<SubscriptionEntry>, RepoError> {
        let rows = query_as::<_, SubscriptionRow>(
            r#"
            SELECT s.channel_id, c.username, s.created_at
              FROM subscriptions s
             INNER JOIN channels c ON c.id = s.channel_id
             WHERE s.subscriber_id = $1
             ORDER BY s.created_at DESC, s.id DESC
             LIMIT $2 OFFSET $3
            "#,
        )
        .bind(subscriber_id)
        .bind(i64::from(page.limit))
        .bind(page.offset())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| SubscriptionEntry {
                channel_id: row.channel_id,
                username: row.username,
                subscribed_at: row.created_at,
            })
            .collect())
    }

    async fn latest_subscribers(
        &self,
        channel_id: Uuid,
        limit: u32,
    ) -> Result<Vec<SubscriberEntry>, RepoError> {
        self.list_subscribers(channel_id, PageRequest::new(1, limit))
            .await
    }

    async fn latest_subscriptions(
        &self,
        subscriber_id: Uuid,
        limit: u32,
    ) -> Result<Vec<SubscriptionEntry>, RepoError> {
        self.list_subscriptions(subscriber_id, PageRequest::new(1, limit))
            .await
    }
}
