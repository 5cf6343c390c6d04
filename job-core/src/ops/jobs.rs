use chrono::Utc;
use sqlx::QueryBuilder;
use uuid::Uuid;

use crate::{
    error::JobError,
    types::{Job, JobInit, JobPatch, JobState},
};

pub async fn insert_job<'c, E>(
    executor: E,
    init: &JobInit,
    state: JobState,
) -> Result<Uuid, JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let id = Uuid::now_v7();
    let now = Utc::now();
    let execute_after = init.execute_after.unwrap_or(now);
    let args = serde_json::to_value(&init.args)?;

    sqlx::query_as::<_, (Uuid,)>(
        r#"
INSERT INTO jobs
    (id, command, args, state, queue, priority, created_at, execute_after,
     max_runtime_secs, max_retries, is_retry_job, original_job_id)
VALUES
    ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, FALSE, NULL)
RETURNING id
"#,
    )
    .bind(id)
    .bind(&init.command)
    .bind(args)
    .bind(state)
    .bind(&init.queue)
    .bind(init.priority)
    .bind(now)
    .bind(execute_after)
    .bind(init.max_runtime_secs)
    .bind(init.max_retries)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// Inserts a retry of `original_job_id`, copying its command/args/queue but
/// with a fresh id, `is_retry_job = TRUE`, and `execute_after` set by the
/// caller's retry scheduler.
pub async fn insert_retry_job<'c, E>(
    executor: E,
    original: &Job,
    execute_after: chrono::DateTime<Utc>,
) -> Result<Uuid, JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let id = Uuid::now_v7();
    let now = Utc::now();
    let args = serde_json::to_value(&original.args)?;

    sqlx::query_as::<_, (Uuid,)>(
        r#"
INSERT INTO jobs
    (id, command, args, state, queue, priority, created_at, execute_after,
     max_runtime_secs, max_retries, is_retry_job, original_job_id)
VALUES
    ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE, $11)
RETURNING id
"#,
    )
    .bind(id)
    .bind(&original.command)
    .bind(args)
    .bind(JobState::Pending)
    .bind(&original.queue)
    .bind(original.priority)
    .bind(now)
    .bind(execute_after)
    .bind(original.max_runtime_secs)
    .bind(original.max_retries)
    .bind(original.id)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

pub async fn get_job<'c, E>(executor: E, id: Uuid) -> Result<Job, JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or(JobError::NotFound(id))
}

/// The first job (by id ASC) with this exact `(command, args)` pair. Arg
/// equality is byte-exact on the serialized jsonb form.
pub async fn find_by_command_args<'c, E>(
    executor: E,
    command: &str,
    args: &[String],
) -> Result<Option<Job>, JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let args_json = serde_json::to_value(args)?;
    Ok(sqlx::query_as::<_, Job>(
        "SELECT * FROM jobs WHERE command = $1 AND args = $2 ORDER BY id ASC LIMIT 1",
    )
    .bind(command)
    .bind(args_json)
    .fetch_optional(executor)
    .await?)
}

pub async fn delete_job<'c, E>(executor: E, id: Uuid) -> Result<(), JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    sqlx::query("DELETE FROM jobs WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn find_job<'c, E>(executor: E, id: Uuid) -> Result<Option<Job>, JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    Ok(
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?,
    )
}

/// Selects the single next candidate per spec ordering (`priority ASC, id
/// ASC`): `workerName IS NULL`, `executeAfter < now`, `state = PENDING`,
/// excluding `excluded_ids`/`excluded_queues`, and if `restricted_queues` is
/// non-empty, restricted to it. Does not check dependency satisfaction -
/// that is `JobManager`'s job via `DependencyGraph::incoming`.
pub async fn find_pending<'c, E>(
    executor: E,
    excluded_ids: &[Uuid],
    excluded_queues: &[String],
    restricted_queues: &[String],
) -> Result<Option<Job>, JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let mut query = QueryBuilder::new(
        "SELECT * FROM jobs WHERE state = 'pending' AND worker_name IS NULL AND execute_after < NOW()",
    );

    if !excluded_ids.is_empty() {
        query.push(" AND id <> ALL(");
        query.push_bind(excluded_ids);
        query.push(")");
    }
    if !excluded_queues.is_empty() {
        query.push(" AND queue <> ALL(");
        query.push_bind(excluded_queues);
        query.push(")");
    }
    if !restricted_queues.is_empty() {
        query.push(" AND queue = ANY(");
        query.push_bind(restricted_queues);
        query.push(")");
    }

    query.push(" ORDER BY priority ASC, id ASC LIMIT 1");

    Ok(query.build_query_as::<Job>().fetch_optional(executor).await?)
}

/// `UPDATE jobs SET worker_name = ? WHERE id = ? AND worker_name IS NULL`.
/// Returns `true` iff this call's row was the one affected - the single
/// atomic primitive `claimNext` relies on for at-most-one-claimant.
pub async fn claim_atomic<'c, E>(executor: E, id: Uuid, worker_name: &str) -> Result<bool, JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let now = Utc::now();
    let res = sqlx::query(
        r#"
UPDATE jobs
SET state = 'running', worker_name = $1, started_at = $2, checked_at = $2
WHERE id = $3 AND worker_name IS NULL
"#,
    )
    .bind(worker_name)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(res.rows_affected() == 1)
}

/// Applies a partial update to a job row. Returns `NotFound` if no row with
/// this id exists.
pub async fn update_job<'c, E>(executor: E, id: Uuid, patch: &JobPatch) -> Result<(), JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let mut query = QueryBuilder::new("UPDATE jobs SET ");
    let mut separated = query.separated(", ");
    let mut touched = false;

    if let Some(state) = patch.state {
        separated.push("state = ").push_bind_unseparated(state);
        touched = true;
    }
    if let Some(worker_name) = &patch.worker_name {
        separated
            .push("worker_name = ")
            .push_bind_unseparated(worker_name.clone());
        touched = true;
    }
    if let Some(started_at) = patch.started_at {
        separated
            .push("started_at = ")
            .push_bind_unseparated(started_at);
        touched = true;
    }
    if let Some(checked_at) = patch.checked_at {
        separated
            .push("checked_at = ")
            .push_bind_unseparated(checked_at);
        touched = true;
    }
    if let Some(closed_at) = patch.closed_at {
        separated
            .push("closed_at = ")
            .push_bind_unseparated(closed_at);
        touched = true;
    }
    if let Some(execute_after) = patch.execute_after {
        separated
            .push("execute_after = ")
            .push_bind_unseparated(execute_after);
        touched = true;
    }
    if let Some(output) = &patch.output {
        separated
            .push("output = ")
            .push_bind_unseparated(output.clone());
        touched = true;
    }
    if let Some(error_output) = &patch.error_output {
        separated
            .push("error_output = ")
            .push_bind_unseparated(error_output.clone());
        touched = true;
    }
    if let Some(exit_code) = patch.exit_code {
        separated
            .push("exit_code = ")
            .push_bind_unseparated(exit_code);
        touched = true;
    }

    if !touched {
        return Ok(());
    }

    query.push(" WHERE id = ");
    query.push_bind(id);

    let res = query.build().execute(executor).await?;
    if res.rows_affected() == 0 {
        return Err(JobError::NotFound(id));
    }
    Ok(())
}

pub async fn find_for_related_entity<'c, E>(
    executor: E,
    command: &str,
    related_class: &str,
    related_id: &serde_json::Value,
    states: &[JobState],
) -> Result<Option<Job>, JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let mut query = QueryBuilder::new(
        r#"
SELECT j.*
FROM jobs j
JOIN job_related_entities r ON r.job_id = j.id
WHERE j.command = "#,
    );
    query.push_bind(command);
    query.push(" AND r.related_class = ");
    query.push_bind(related_class);
    query.push(" AND r.related_id = ");
    query.push_bind(related_id);

    if !states.is_empty() {
        query.push(" AND j.state = ANY(");
        query.push_bind(states);
        query.push(")");
    }

    query.push(" ORDER BY j.created_at DESC LIMIT 1");

    Ok(query.build_query_as::<Job>().fetch_optional(executor).await?)
}

pub async fn find_all_for_related_entity<'c, E>(
    executor: E,
    related_class: &str,
    related_id: &serde_json::Value,
) -> Result<Vec<Job>, JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    Ok(sqlx::query_as::<_, Job>(
        r#"
SELECT j.*
FROM jobs j
JOIN job_related_entities r ON r.job_id = j.id
WHERE r.related_class = $1 AND r.related_id = $2
ORDER BY j.created_at DESC
"#,
    )
    .bind(related_class)
    .bind(related_id)
    .fetch_all(executor)
    .await?)
}

/// Most recent jobs in a closed-non-successful state, newest first.
pub async fn find_last_errored<'c, E>(executor: E, limit: i64) -> Result<Vec<Job>, JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    Ok(sqlx::query_as::<_, Job>(
        r#"
SELECT *
FROM jobs
WHERE state IN ('failed', 'terminated', 'incomplete', 'canceled')
ORDER BY closed_at DESC NULLS LAST
LIMIT $1
"#,
    )
    .bind(limit)
    .fetch_all(executor)
    .await?)
}

/// Distinct, non-empty queue names currently holding a non-terminal job.
pub async fn list_queues<'c, E>(executor: E) -> Result<Vec<String>, JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
SELECT DISTINCT queue
FROM jobs
WHERE queue <> ''
  AND state IN ('new', 'pending', 'running')
ORDER BY queue
"#,
    )
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().map(|(q,)| q).collect())
}

/// Count of `PENDING`, unclaimed, due jobs in `queue` - a true `COUNT(*)`,
/// correcting the single-row-result bug noted against the source this was
/// distilled from.
pub async fn available_count<'c, E>(executor: E, queue: &str) -> Result<i64, JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let (count,): (i64,) = sqlx::query_as(
        r#"
SELECT COUNT(*)
FROM jobs
WHERE state = 'pending'
  AND queue = $1
  AND worker_name IS NULL
  AND execute_after < NOW()
"#,
    )
    .bind(queue)
    .fetch_one(executor)
    .await?;
    Ok(count)
}

pub async fn count_retry_jobs<'c, E>(executor: E, original_job_id: Uuid) -> Result<i64, JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM jobs WHERE original_job_id = $1")
            .bind(original_job_id)
            .fetch_one(executor)
            .await?;
    Ok(count)
}
