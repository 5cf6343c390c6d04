//! Core of a persistent, Postgres-backed job queue: durable job records,
//! atomic worker claim under contention, retry scheduling, and cascading
//! close semantics through a dependency graph.
//!
//! The worker loop that actually forks and runs commands, and the HTTP/CLI
//! surfaces that submit jobs, are external collaborators - this crate
//! consumes a `sqlx::PgPool` and an event-dispatch hook and exposes the
//! operations in [`JobManager`] and [`Cleanup`].
pub mod cleanup;
pub mod config;
pub mod dependency_graph;
pub mod error;
pub mod events;
pub mod manager;
pub mod metrics_consts;
pub mod ops;
pub mod retry;
pub mod state_machine;
pub mod store;
pub mod types;

pub use cleanup::{Cleanup, CleanupStatus};
pub use config::PoolConfig;
pub use error::JobError;
pub use events::{EventListener, StateChangeEvent, TracingEventListener};
pub use manager::JobManager;
pub use retry::{ExponentialRetryScheduler, RetryScheduler};
pub use store::Store;
pub use types::{Dependency, Job, JobInit, JobPatch, JobState, RelatedEntity};
