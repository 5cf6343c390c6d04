//! Pure predicates and classifiers over [`JobState`]/[`Job`]. Free functions,
//! not methods on some base entity type - there is no inheritance hierarchy
//! for a `Job` to sit in, and state classification is data about a record,
//! not behavior the record performs.
use crate::types::{Job, JobState};

/// Terminal states: no further transitions occur, and the job is never
/// selected by claim again.
pub fn is_final(state: JobState) -> bool {
    matches!(
        state,
        JobState::Finished
            | JobState::Failed
            | JobState::Terminated
            | JobState::Incomplete
            | JobState::Canceled
    )
}

/// Terminal states that are not a clean success.
pub fn is_closed_non_successful(state: JobState) -> bool {
    matches!(
        state,
        JobState::Failed | JobState::Terminated | JobState::Incomplete | JobState::Canceled
    )
}

/// A job is startable once it is `Pending` and every upstream dependency has
/// reached `Finished`. `incoming_states` is the caller's already-fetched
/// state of `DependencyGraph::incoming(job)`.
pub fn is_startable(job: &Job, incoming_states: &[JobState]) -> bool {
    job.state == JobState::Pending
        && incoming_states.iter().all(|s| *s == JobState::Finished)
}

/// The only states `JobManager::close` accepts as a target.
pub const ALLOWED_CLOSE_STATES: &[JobState] = &[
    JobState::Finished,
    JobState::Failed,
    JobState::Terminated,
    JobState::Incomplete,
    JobState::Canceled,
];

pub fn is_allowed_close_state(state: JobState) -> bool {
    ALLOWED_CLOSE_STATES.contains(&state)
}
