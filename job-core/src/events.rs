//! Event-dispatch hook fired from inside `JobManager::close`. Listeners are
//! called in registration order with a mutable event; each may rewrite
//! `new_state` before the next listener runs, and whatever survives the
//! last listener is the state the cascade actually commits.
use uuid::Uuid;

use crate::types::JobState;

pub const JOB_STATE_CHANGE_CHANNEL: &str = "job_state_change";

#[derive(Debug, Clone)]
pub struct StateChangeEvent {
    pub job_id: Uuid,
    pub new_state: JobState,
}

#[async_trait::async_trait]
pub trait EventListener: Send + Sync {
    async fn on_job_state_change(&self, event: &mut StateChangeEvent);
}

/// The default listener: observes the transition and logs it, without ever
/// substituting a different outcome. A no-op `Vec<Arc<dyn EventListener>>`
/// is just as valid a configuration - the event is simply never observed.
#[derive(Debug, Default)]
pub struct TracingEventListener;

#[async_trait::async_trait]
impl EventListener for TracingEventListener {
    async fn on_job_state_change(&self, event: &mut StateChangeEvent) {
        tracing::info!(
            job_id = %event.job_id,
            new_state = ?event.new_state,
            channel = JOB_STATE_CHANGE_CHANNEL,
            "job state change",
        );
    }
}
