//! The orchestration core: submit, deduplicate, claim, and close jobs,
//! recursing through the dependency graph on close. Everything here is an
//! `async fn` that awaits pool I/O directly - no spawned tasks, no locks
//! beyond the database's own conditional `UPDATE`.
use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    dependency_graph,
    error::JobError,
    events::{EventListener, StateChangeEvent},
    metrics_consts,
    ops,
    retry::RetryScheduler,
    state_machine,
    store::Store,
    types::{Job, JobInit, JobPatch, JobState},
};

pub struct JobManager {
    store: Store,
    retry_scheduler: Arc<dyn RetryScheduler>,
    listeners: Vec<Arc<dyn EventListener>>,
}

impl JobManager {
    pub fn new(
        store: Store,
        retry_scheduler: Arc<dyn RetryScheduler>,
        listeners: Vec<Arc<dyn EventListener>>,
    ) -> Self {
        Self {
            store,
            retry_scheduler,
            listeners,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Empty `dependencies` starts the job `Pending` (immediately
    /// claimable); a non-empty set starts it `New`, awaiting the external
    /// promotion to `Pending` once its dependencies are wired up and
    /// satisfied (see the crate-level lifecycle note).
    pub async fn submit(&self, init: JobInit) -> Result<Job, JobError> {
        let initial_state = if init.dependencies.is_empty() {
            JobState::Pending
        } else {
            JobState::New
        };

        let id = ops::jobs::insert_job(self.store.pool(), &init, initial_state).await?;

        for source_id in &init.dependencies {
            ops::dependencies::insert_dependency(self.store.pool(), *source_id, id).await?;
        }

        common_metrics::inc(metrics_consts::JOB_SUBMITTED, &[], 1);
        ops::jobs::get_job(self.store.pool(), id).await
    }

    pub async fn find(&self, command: &str, args: &[String]) -> Result<Option<Job>, JobError> {
        ops::jobs::find_by_command_args(self.store.pool(), command, args).await
    }

    /// Exactly one concurrent caller for a given `(command, args)` gets a
    /// freshly created job; all others get the pre-existing one. See the
    /// crate design notes for why this doesn't need a unique index.
    pub async fn get_or_create(&self, command: &str, args: &[String]) -> Result<Job, JobError> {
        let init = JobInit {
            command: command.to_string(),
            args: args.to_vec(),
            ..JobInit::default()
        };

        let speculative_id = ops::jobs::insert_job(self.store.pool(), &init, JobState::New).await?;

        let winner = ops::jobs::find_by_command_args(self.store.pool(), command, args)
            .await?
            .ok_or_else(|| {
                JobError::Conflict(format!(
                    "getOrCreate lost its own speculative insert for {command}"
                ))
            })?;

        if winner.id == speculative_id {
            ops::jobs::update_job(
                self.store.pool(),
                winner.id,
                &JobPatch::new().state(JobState::Pending),
            )
            .await?;
            return ops::jobs::get_job(self.store.pool(), winner.id).await;
        }

        common_metrics::inc(metrics_consts::JOB_GET_OR_CREATE_RACE_LOST, &[], 1);
        ops::jobs::delete_job(self.store.pool(), speculative_id).await?;
        Ok(winner)
    }

    pub async fn find_pending(
        &self,
        excluded_ids: &[Uuid],
        excluded_queues: &[String],
        restricted_queues: &[String],
    ) -> Result<Option<Job>, JobError> {
        ops::jobs::find_pending(
            self.store.pool(),
            excluded_ids,
            excluded_queues,
            restricted_queues,
        )
        .await
    }

    /// Loops candidates from `find_pending`, skipping any that aren't
    /// startable or lose the atomic claim race, appending each loser's id to
    /// `excluded_ids` (caller-visible and caller-owned across calls).
    pub async fn claim_next(
        &self,
        worker_name: &str,
        excluded_ids: &mut Vec<Uuid>,
        excluded_queues: &[String],
        restricted_queues: &[String],
    ) -> Result<Option<Job>, JobError> {
        loop {
            let Some(candidate) =
                ops::jobs::find_pending(self.store.pool(), excluded_ids, excluded_queues, restricted_queues)
                    .await?
            else {
                return Ok(None);
            };

            let mut conn = self.store.pool().acquire().await?;
            let incoming_jobs = dependency_graph::incoming(&mut conn, candidate.id).await?;
            let incoming_states: Vec<JobState> = incoming_jobs.iter().map(|j| j.state).collect();
            drop(conn);

            if state_machine::is_startable(&candidate, &incoming_states)
                && ops::jobs::claim_atomic(self.store.pool(), candidate.id, worker_name).await?
            {
                common_metrics::inc(metrics_consts::JOB_CLAIMED, &[], 1);
                return ops::jobs::get_job(self.store.pool(), candidate.id)
                    .await
                    .map(Some);
            }

            common_metrics::inc(metrics_consts::JOB_CLAIM_CONTENDED, &[], 1);
            excluded_ids.push(candidate.id);
        }
    }

    pub async fn incoming(&self, job_id: Uuid) -> Result<Vec<Job>, JobError> {
        let mut conn = self.store.pool().acquire().await?;
        dependency_graph::incoming(&mut conn, job_id).await
    }

    pub async fn outgoing(&self, job_id: Uuid) -> Result<Vec<Job>, JobError> {
        let mut conn = self.store.pool().acquire().await?;
        dependency_graph::outgoing(&mut conn, job_id).await
    }

    /// Records a worker's outcome fields on a job ahead of `close`. `output`
    /// and `error_output` are compressed transparently before being
    /// persisted - see [`ops::compress`].
    pub async fn record_result(
        &self,
        job_id: Uuid,
        output: Option<String>,
        error_output: Option<String>,
        exit_code: Option<i32>,
    ) -> Result<(), JobError> {
        let patch = JobPatch::new()
            .output(ops::compress::compress_result_field(output))
            .error_output(ops::compress::compress_result_field(error_output))
            .exit_code(exit_code);
        ops::jobs::update_job(self.store.pool(), job_id, &patch).await
    }

    pub async fn job_output(&self, job_id: Uuid) -> Result<Option<String>, JobError> {
        let job = ops::jobs::get_job(self.store.pool(), job_id).await?;
        Ok(ops::compress::decompress_result_field(job.output))
    }

    pub async fn job_error_output(&self, job_id: Uuid) -> Result<Option<String>, JobError> {
        let job = ops::jobs::get_job(self.store.pool(), job_id).await?;
        Ok(ops::compress::decompress_result_field(job.error_output))
    }

    /// Associates `job_id` with an external business object. `related_id`
    /// must be a non-empty JSON object; `(related_class, related_id)` is
    /// deliberately not unique across jobs.
    pub async fn attach_related_entity(
        &self,
        job_id: Uuid,
        related_class: &str,
        related_id: &serde_json::Value,
    ) -> Result<(), JobError> {
        if related_class.is_empty() {
            return Err(JobError::InvalidArgument(
                "related_class must not be empty".to_string(),
            ));
        }
        match related_id.as_object() {
            Some(obj) if !obj.is_empty() => {}
            Some(_) => {
                return Err(JobError::InvalidArgument(
                    "related_id must not be an empty object".to_string(),
                ))
            }
            None => {
                return Err(JobError::InvalidArgument(
                    "related_id must be a json object".to_string(),
                ))
            }
        }

        ops::related::insert_related_entity(self.store.pool(), job_id, related_class, related_id)
            .await
    }

    pub async fn find_for_related_entity(
        &self,
        command: &str,
        related_class: &str,
        related_id: &serde_json::Value,
        states: &[JobState],
    ) -> Result<Option<Job>, JobError> {
        ops::jobs::find_for_related_entity(self.store.pool(), command, related_class, related_id, states)
            .await
    }

    pub async fn find_all_for_related_entity(
        &self,
        related_class: &str,
        related_id: &serde_json::Value,
    ) -> Result<Vec<Job>, JobError> {
        ops::jobs::find_all_for_related_entity(self.store.pool(), related_class, related_id).await
    }

    pub async fn find_last_errored(&self, n: i64) -> Result<Vec<Job>, JobError> {
        ops::jobs::find_last_errored(self.store.pool(), n).await
    }

    pub async fn list_queues(&self) -> Result<Vec<String>, JobError> {
        ops::jobs::list_queues(self.store.pool()).await
    }

    pub async fn available_count(&self, queue: &str) -> Result<i64, JobError> {
        ops::jobs::available_count(self.store.pool(), queue).await
    }

    /// Terminal-state cascade, run inside one transaction. `final_state`
    /// must be one of the allowed close states; anything else is
    /// `InvalidState` without touching the database.
    pub async fn close(&self, job_id: Uuid, final_state: JobState) -> Result<(), JobError> {
        if !state_machine::is_allowed_close_state(final_state) {
            return Err(JobError::InvalidState {
                job: job_id,
                state: format!("{final_state:?}"),
            });
        }

        let mut tx = self.store.begin().await?;
        let mut visited = HashSet::new();
        self.close_inner(&mut tx, job_id, final_state, &mut visited)
            .await?;
        tx.commit().await?;
        common_metrics::inc(metrics_consts::JOB_CLOSED, &[], 1);
        Ok(())
    }

    fn close_inner<'a>(
        &'a self,
        conn: &'a mut PgConnection,
        job_id: Uuid,
        final_state: JobState,
        visited: &'a mut HashSet<Uuid>,
    ) -> BoxFuture<'a, Result<(), JobError>> {
        Box::pin(async move {
            if visited.contains(&job_id) {
                return Ok(());
            }
            visited.insert(job_id);

            let Some(job) = ops::jobs::find_job(&mut *conn, job_id).await? else {
                return Ok(());
            };

            if state_machine::is_final(job.state) {
                return Ok(());
            }

            let retry_count = ops::jobs::count_retry_jobs(&mut *conn, job.id).await?;
            let has_retry_jobs = retry_count > 0;

            let effective_final_state = if job.is_retry_job || !has_retry_jobs {
                let mut event = StateChangeEvent {
                    job_id: job.id,
                    new_state: final_state,
                };
                for listener in &self.listeners {
                    listener.on_job_state_change(&mut event).await;
                }
                event.new_state
            } else {
                final_state
            };

            match effective_final_state {
                JobState::Canceled => {
                    close_job_row(&mut *conn, job.id, JobState::Canceled).await?;

                    if job.is_retry_job {
                        if let Some(original_id) = job.original_job_id {
                            self.close_inner(conn, original_id, JobState::Canceled, visited)
                                .await?;
                        }
                        return Ok(());
                    }

                    let incoming_jobs = dependency_graph::incoming(conn, job.id).await?;
                    for s in incoming_jobs {
                        self.close_inner(&mut *conn, s.id, JobState::Canceled, &mut *visited)
                            .await?;
                    }
                    Ok(())
                }

                JobState::Failed | JobState::Terminated | JobState::Incomplete => {
                    if job.is_retry_job {
                        close_job_row(&mut *conn, job.id, effective_final_state).await?;
                        if let Some(original_id) = job.original_job_id {
                            self.close_inner(conn, original_id, effective_final_state, visited)
                                .await?;
                        }
                        return Ok(());
                    }

                    if retry_count < job.max_retries as i64 {
                        let execute_after = self
                            .retry_scheduler
                            .schedule_next_retry(Utc::now(), retry_count as u32);
                        ops::jobs::insert_retry_job(&mut *conn, &job, execute_after).await?;
                        common_metrics::inc(metrics_consts::JOB_RETRY_CREATED, &[], 1);
                        // j.state is left alone: it remains observable as awaiting retry.
                        return Ok(());
                    }

                    close_job_row(&mut *conn, job.id, effective_final_state).await?;

                    let incoming_jobs = dependency_graph::incoming(conn, job.id).await?;
                    for s in incoming_jobs {
                        if matches!(s.state, JobState::Pending | JobState::New) {
                            self.close_inner(&mut *conn, s.id, JobState::Canceled, &mut *visited)
                                .await?;
                        }
                    }
                    Ok(())
                }

                JobState::Finished => {
                    if job.is_retry_job {
                        if let Some(original_id) = job.original_job_id {
                            close_job_row(&mut *conn, original_id, JobState::Finished).await?;
                        }
                    }
                    close_job_row(&mut *conn, job.id, JobState::Finished).await?;
                    Ok(())
                }

                other => Err(JobError::InvalidState {
                    job: job.id,
                    state: format!("{other:?}"),
                }),
            }
        })
    }
}

async fn close_job_row<'c, E>(executor: E, id: Uuid, state: JobState) -> Result<(), JobError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    ops::jobs::update_job(
        executor,
        id,
        &JobPatch::new().state(state).closed_at(Some(Utc::now())),
    )
    .await
}
