use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{error::JobError, types::Job};

/// One `RUNNING` job whose `checked_at` predates the staleness threshold,
/// excluding ids already yielded this sweep. `NULL`-`checked_at` rows (never
/// heartbeated) count as stale from their `started_at`.
pub async fn stale_running_candidate<'c, E>(
    executor: E,
    staleness: Duration,
    excluded: &[Uuid],
) -> Result<Option<Job>, JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let cutoff = Utc::now() - staleness;
    Ok(sqlx::query_as::<_, Job>(
        r#"
SELECT *
FROM jobs
WHERE state = 'running'
  AND worker_name IS NOT NULL
  AND COALESCE(checked_at, started_at) < $1
  AND id <> ALL($2)
ORDER BY id ASC
LIMIT 1
"#,
    )
    .bind(cutoff)
    .bind(excluded)
    .fetch_optional(executor)
    .await?)
}

/// Pass 1: `FINISHED` non-retry jobs closed before `cutoff`.
pub async fn retention_pass_finished<'c, E>(
    executor: E,
    cutoff: DateTime<Utc>,
    batch_size: i64,
) -> Result<Vec<Job>, JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    Ok(sqlx::query_as::<_, Job>(
        r#"
SELECT *
FROM jobs
WHERE state = 'finished'
  AND is_retry_job = FALSE
  AND closed_at < $1
ORDER BY id ASC
LIMIT $2
"#,
    )
    .bind(cutoff)
    .bind(batch_size)
    .fetch_all(executor)
    .await?)
}

/// Pass 2: any other closed, non-retry job closed before `cutoff`.
pub async fn retention_pass_other_closed<'c, E>(
    executor: E,
    cutoff: DateTime<Utc>,
    batch_size: i64,
) -> Result<Vec<Job>, JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    Ok(sqlx::query_as::<_, Job>(
        r#"
SELECT *
FROM jobs
WHERE state IN ('failed', 'terminated', 'incomplete', 'canceled')
  AND is_retry_job = FALSE
  AND closed_at < $1
ORDER BY id ASC
LIMIT $2
"#,
    )
    .bind(cutoff)
    .bind(batch_size)
    .fetch_all(executor)
    .await?)
}

/// Pass 3: `CANCELED` non-retry jobs that never ran, so have no `closed_at`
/// - aged out by `created_at` instead.
pub async fn retention_pass_canceled_unrun<'c, E>(
    executor: E,
    cutoff: DateTime<Utc>,
    batch_size: i64,
) -> Result<Vec<Job>, JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    Ok(sqlx::query_as::<_, Job>(
        r#"
SELECT *
FROM jobs
WHERE state = 'canceled'
  AND is_retry_job = FALSE
  AND created_at < $1
ORDER BY id ASC
LIMIT $2
"#,
    )
    .bind(cutoff)
    .bind(batch_size)
    .fetch_all(executor)
    .await?)
}
