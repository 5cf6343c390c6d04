use uuid::Uuid;

/// The one error type every fallible public method in this crate returns.
/// `sqlx::Error` never leaks past the Store boundary unwrapped.
#[derive(thiserror::Error, Debug)]
pub enum JobError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state for job {job}: {state}")]
    InvalidState { job: Uuid, state: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        JobError::Serialization(err.to_string())
    }
}
