use uuid::Uuid;

use crate::error::JobError;

pub async fn insert_related_entity<'c, E>(
    executor: E,
    job_id: Uuid,
    related_class: &str,
    related_id: &serde_json::Value,
) -> Result<(), JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    sqlx::query(
        "INSERT INTO job_related_entities (job_id, related_class, related_id) VALUES ($1, $2, $3)",
    )
    .bind(job_id)
    .bind(related_class)
    .bind(related_id)
    .execute(executor)
    .await?;
    Ok(())
}
