use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The state a job currently occupies. See the crate-level docs for the full
/// transition table; in short, everything left of `Running` is "not yet run",
/// and everything right of it is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "job_state", rename_all = "lowercase")]
pub enum JobState {
    New,
    Pending,
    Running,
    Finished,
    Failed,
    Terminated,
    Incomplete,
    Canceled,
}

/// A durable record of one command invocation. Rows are owned by the
/// database; a `Job` value is a short-lived view of one row and should be
/// re-fetched after crossing a transaction boundary.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub command: String,
    #[sqlx(json)]
    pub args: Vec<String>,
    pub state: JobState,
    pub queue: String,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub execute_after: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub checked_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub max_runtime_secs: i64,
    pub worker_name: Option<String>,
    pub output: Option<String>,
    pub error_output: Option<String>,
    pub exit_code: Option<i32>,
    pub is_retry_job: bool,
    pub original_job_id: Option<Uuid>,
    pub max_retries: i32,
}

/// The fields a caller provides to create a new job. Everything else
/// (`id`, timestamps, `state`) is decided by `JobManager::submit`.
#[derive(Debug, Clone)]
pub struct JobInit {
    pub command: String,
    pub args: Vec<String>,
    pub queue: String,
    pub priority: i32,
    pub max_retries: i32,
    pub max_runtime_secs: i64,
    pub execute_after: Option<DateTime<Utc>>,
    /// Upstream job ids this job must wait on before it's startable.
    pub dependencies: Vec<Uuid>,
}

impl Default for JobInit {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            queue: "default".to_string(),
            priority: 0,
            max_retries: 0,
            max_runtime_secs: 0,
            execute_after: None,
            dependencies: Vec::new(),
        }
    }
}

/// An (class, id-json) tuple associating a job with an external business
/// object. `(related_class, related_id)` is deliberately not unique across
/// jobs - the same entity may have several jobs queued against it over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub related_class: String,
    pub related_id: serde_json::Value,
}

/// A directed source->dest edge: `source` must reach `Finished` before
/// `dest` is startable. No self-loops; the transitive closure is never
/// materialized, only walked one hop at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct Dependency {
    pub source_job_id: Uuid,
    pub dest_job_id: Uuid,
}

/// Partial update applied to one job row. `None` means "leave this column
/// alone"; fields that are themselves `Option<T>` (e.g. `worker_name`) use
/// `Some(None)` to mean "set this column to NULL".
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub state: Option<JobState>,
    pub worker_name: Option<Option<String>>,
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub checked_at: Option<Option<DateTime<Utc>>>,
    pub closed_at: Option<Option<DateTime<Utc>>>,
    pub execute_after: Option<DateTime<Utc>>,
    pub output: Option<Option<String>>,
    pub error_output: Option<Option<String>>,
    pub exit_code: Option<Option<i32>>,
}

impl JobPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(mut self, state: JobState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn worker_name(mut self, worker_name: Option<String>) -> Self {
        self.worker_name = Some(worker_name);
        self
    }

    pub fn started_at(mut self, started_at: Option<DateTime<Utc>>) -> Self {
        self.started_at = Some(started_at);
        self
    }

    pub fn checked_at(mut self, checked_at: Option<DateTime<Utc>>) -> Self {
        self.checked_at = Some(checked_at);
        self
    }

    pub fn closed_at(mut self, closed_at: Option<DateTime<Utc>>) -> Self {
        self.closed_at = Some(closed_at);
        self
    }

    pub fn execute_after(mut self, execute_after: DateTime<Utc>) -> Self {
        self.execute_after = Some(execute_after);
        self
    }

    pub fn output(mut self, output: Option<String>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn error_output(mut self, error_output: Option<String>) -> Self {
        self.error_output = Some(error_output);
        self
    }

    pub fn exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = Some(exit_code);
        self
    }
}
