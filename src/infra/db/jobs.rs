use async_trait::async_trait;
use sqlx::query_scalar;

use crate::{
    application::repos::{JobsRepo, NewJobRecord, RepoError},
    domain::types::JobType,
};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl JobsRepo for PostgresRepositories {
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError> {
        let id = query_scalar::<_, String>(
            r#"
            SELECT (apalis.push_job($1, $2::json, $3, $4, $5, $6)).id
            "#,
        )
        .bind(job.job_type.as_str())
        .bind(job.payload)
        .bind("Pending")
        .bind(job.run_at)
        .bind(job.max_attempts)
        .bind(job.priority)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(id)
    }

    async fn count_dead_letter(&self, job_type: JobType) -> Result<u64, RepoError> {
        let count = query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
              FROM apalis.jobs
             WHERE job_type = $1
               AND status = 'Killed'
            "#,
        )
        .bind(job_type.as_str())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        count
            .try_into()
            .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
    }
}
