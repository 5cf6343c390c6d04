//! Periodic housekeeping: detect workers that stopped heartbeating and
//! reclaim their job, then prune old closed jobs under a retention policy.
//! Exposes its outcome as a status snapshot the same way this codebase's
//! other background-worker binaries track `last_delete`/`last_error` for
//! their control/status endpoint.
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::JobError, manager::JobManager, metrics_consts, ops, state_machine, store::Store,
    types::{Job, JobState},
};

#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// How long a `RUNNING` job may go without a heartbeat before it's
    /// considered abandoned by its worker.
    pub stale_threshold: Duration,
    pub max_retention_succeeded: Duration,
    pub max_retention: Duration,
    /// Rows fetched per retention query.
    pub batch_size: i64,
    /// Jobs processed (stale-closed + deleted) before a run stops early.
    pub per_call: usize,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            stale_threshold: Duration::minutes(5),
            max_retention_succeeded: Duration::hours(1),
            max_retention: Duration::days(7),
            batch_size: 100,
            per_call: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupStatus {
    pub last_stale_closed: Option<u64>,
    pub last_stale_errors: Option<u64>,
    pub last_deleted_finished: Option<u64>,
    pub last_deleted_other_closed: Option<u64>,
    pub last_deleted_canceled_unrun: Option<u64>,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
    pub last_successful_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub stale_job_ids: Vec<Uuid>,
}

pub struct Cleanup {
    manager: Arc<JobManager>,
    store: Store,
    config: CleanupConfig,
}

impl Cleanup {
    pub fn new(manager: Arc<JobManager>, store: Store, config: CleanupConfig) -> Self {
        Self {
            manager,
            store,
            config,
        }
    }

    pub async fn run_once(&self) -> CleanupStatus {
        match self.run_once_inner().await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!("cleanup run failed: {e:?}");
                CleanupStatus {
                    last_error: Some(e.to_string()),
                    last_error_time: Some(Utc::now()),
                    ..Default::default()
                }
            }
        }
    }

    async fn run_once_inner(&self) -> Result<CleanupStatus, JobError> {
        let mut status = CleanupStatus::default();
        let mut processed = 0usize;

        let (stale_closed, stale_errors) = self.sweep_stale(&mut status, &mut processed).await?;
        status.last_stale_closed = Some(stale_closed);
        status.last_stale_errors = Some(stale_errors);

        let succeeded_cutoff = Utc::now() - self.config.max_retention_succeeded;
        let mut deleted_finished = 0u64;
        while processed < self.config.per_call {
            let batch =
                ops::cleanup::retention_pass_finished(self.store.pool(), succeeded_cutoff, self.config.batch_size)
                    .await?;
            if batch.is_empty() {
                break;
            }
            for job in &batch {
                if processed >= self.config.per_call {
                    break;
                }
                self.resolve_and_delete(job).await?;
                deleted_finished += 1;
                processed += 1;
            }
        }
        status.last_deleted_finished = Some(deleted_finished);

        let general_cutoff = Utc::now() - self.config.max_retention;
        let mut deleted_other = 0u64;
        while processed < self.config.per_call {
            let batch =
                ops::cleanup::retention_pass_other_closed(self.store.pool(), general_cutoff, self.config.batch_size)
                    .await?;
            if batch.is_empty() {
                break;
            }
            for job in &batch {
                if processed >= self.config.per_call {
                    break;
                }
                self.resolve_and_delete(job).await?;
                deleted_other += 1;
                processed += 1;
            }
        }
        status.last_deleted_other_closed = Some(deleted_other);

        let mut deleted_canceled = 0u64;
        while processed < self.config.per_call {
            let batch = ops::cleanup::retention_pass_canceled_unrun(
                self.store.pool(),
                general_cutoff,
                self.config.batch_size,
            )
            .await?;
            if batch.is_empty() {
                break;
            }
            for job in &batch {
                if processed >= self.config.per_call {
                    break;
                }
                self.resolve_and_delete(job).await?;
                deleted_canceled += 1;
                processed += 1;
            }
        }
        status.last_deleted_canceled_unrun = Some(deleted_canceled);

        common_metrics::inc(
            metrics_consts::CLEANUP_DELETED,
            &[],
            status.last_deleted_finished.unwrap_or(0)
                + status.last_deleted_other_closed.unwrap_or(0)
                + status.last_deleted_canceled_unrun.unwrap_or(0),
        );

        status.last_successful_run = Some(Utc::now());
        Ok(status)
    }

    /// Repeatedly yields one stale `RUNNING` job at a time, closing each as
    /// `INCOMPLETE` - unless it already has a retry in progress, in which
    /// case closing it here would spawn a second, redundant retry every tick
    /// until the original is reclaimed. A per-job close failure is logged
    /// and skipped rather than aborting the whole sweep.
    async fn sweep_stale(
        &self,
        status: &mut CleanupStatus,
        processed: &mut usize,
    ) -> Result<(u64, u64), JobError> {
        let mut excluded = Vec::new();
        let mut closed = 0u64;
        let mut errors = 0u64;

        while *processed < self.config.per_call {
            let Some(job) =
                ops::cleanup::stale_running_candidate(self.store.pool(), self.config.stale_threshold, &excluded)
                    .await?
            else {
                break;
            };

            excluded.push(job.id);
            status.stale_job_ids.push(job.id);
            *processed += 1;
            common_metrics::inc(metrics_consts::CLEANUP_STALE_FOUND, &[], 1);

            if ops::jobs::count_retry_jobs(self.store.pool(), job.id).await? > 0 {
                continue;
            }

            match self.manager.close(job.id, JobState::Incomplete).await {
                Ok(()) => closed += 1,
                Err(e) => {
                    tracing::warn!(
                        job_id = %job.id,
                        worker_name = job.worker_name.as_deref().unwrap_or(""),
                        checked_at = ?job.checked_at,
                        "failed to close stale job: {e}",
                    );
                    common_metrics::inc(metrics_consts::CLEANUP_ERRORS, &[], 1);
                    errors += 1;
                }
            }
        }

        Ok((closed, errors))
    }

    /// Before deleting `job`: if anything it depends on (`incoming` edges)
    /// is still non-final, force it closed - `FAILED` if `job` was still
    /// `RUNNING`, `CANCELED` otherwise - then drop the dependency rows and
    /// the job itself.
    async fn resolve_and_delete(&self, job: &Job) -> Result<(), JobError> {
        let incoming_edges = ops::dependencies::incoming(self.store.pool(), job.id).await?;

        if !incoming_edges.is_empty() {
            let resolve_state = if job.state == JobState::Running {
                JobState::Failed
            } else {
                JobState::Canceled
            };

            for edge in &incoming_edges {
                if let Some(source) = ops::jobs::find_job(self.store.pool(), edge.source_job_id).await? {
                    if !state_machine::is_final(source.state) {
                        self.manager.close(source.id, resolve_state).await?;
                    }
                }
            }
        }

        let mut tx = self.store.begin().await?;
        ops::dependencies::delete_dependencies_for_dest(&mut *tx, job.id).await?;
        ops::jobs::delete_job(&mut *tx, job.id).await?;
        tx.commit().await?;
        Ok(())
    }
}
