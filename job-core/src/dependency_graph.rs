//! `incoming`/`outgoing` on a job: a thin layer over [`ops::dependencies`]
//! that turns edges into the `Job` rows on the other end. Finite, lazily
//! fetched on each call - nothing here caches across calls, so callers that
//! walk the graph repeatedly within one operation (see `JobManager::close`)
//! are responsible for their own visited-set.
//!
//! Takes `&mut PgConnection` rather than a generic `Executor` because both
//! functions issue more than one query and need to reborrow the connection
//! between them - the same reason `JobManager::close`'s cascade runs against
//! an open `Transaction`'s connection rather than the pool directly.
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{error::JobError, ops, types::Job};

/// The jobs `s` such that `(s -> job_id)` is a dependency edge - i.e. the
/// jobs `job_id` is waiting on.
pub async fn incoming(conn: &mut PgConnection, job_id: Uuid) -> Result<Vec<Job>, JobError> {
    let edges = ops::dependencies::incoming(&mut *conn, job_id).await?;
    let mut jobs = Vec::with_capacity(edges.len());
    for edge in edges {
        if let Some(job) = ops::jobs::find_job(&mut *conn, edge.source_job_id).await? {
            jobs.push(job);
        }
    }
    Ok(jobs)
}

/// The jobs `d` such that `(job_id -> d)` is a dependency edge - i.e. the
/// jobs waiting on `job_id`.
pub async fn outgoing(conn: &mut PgConnection, job_id: Uuid) -> Result<Vec<Job>, JobError> {
    let edges = ops::dependencies::outgoing(&mut *conn, job_id).await?;
    let mut jobs = Vec::with_capacity(edges.len());
    for edge in edges {
        if let Some(job) = ops::jobs::find_job(&mut *conn, edge.dest_job_id).await? {
            jobs.push(job);
        }
    }
    Ok(jobs)
}
