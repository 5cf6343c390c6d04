use uuid::Uuid;

use crate::{error::JobError, types::Dependency};

pub async fn insert_dependency<'c, E>(
    executor: E,
    source_job_id: Uuid,
    dest_job_id: Uuid,
) -> Result<(), JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    if source_job_id == dest_job_id {
        return Err(JobError::InvalidArgument(
            "a job cannot depend on itself".to_string(),
        ));
    }

    sqlx::query("INSERT INTO job_dependencies (source_job_id, dest_job_id) VALUES ($1, $2)")
        .bind(source_job_id)
        .bind(dest_job_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// All edges pointing at `job_id` (jobs it waits on).
pub async fn incoming<'c, E>(executor: E, job_id: Uuid) -> Result<Vec<Dependency>, JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    Ok(
        sqlx::query_as::<_, Dependency>(
            "SELECT source_job_id, dest_job_id FROM job_dependencies WHERE dest_job_id = $1",
        )
        .bind(job_id)
        .fetch_all(executor)
        .await?,
    )
}

/// All edges originating at `job_id` (jobs waiting on it).
pub async fn outgoing<'c, E>(executor: E, job_id: Uuid) -> Result<Vec<Dependency>, JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    Ok(
        sqlx::query_as::<_, Dependency>(
            "SELECT source_job_id, dest_job_id FROM job_dependencies WHERE source_job_id = $1",
        )
        .bind(job_id)
        .fetch_all(executor)
        .await?,
    )
}

pub async fn delete_dependencies_for_dest<'c, E>(executor: E, dest_job_id: Uuid) -> Result<(), JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    sqlx::query("DELETE FROM job_dependencies WHERE dest_job_id = $1")
        .bind(dest_job_id)
        .execute(executor)
        .await?;
    Ok(())
}
