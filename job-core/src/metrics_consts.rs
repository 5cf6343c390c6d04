pub const JOB_SUBMITTED: &str = "job_queue_submitted";
pub const JOB_CLAIMED: &str = "job_queue_claimed";
pub const JOB_CLAIM_CONTENDED: &str = "job_queue_claim_contended";
pub const JOB_CLOSED: &str = "job_queue_closed";
pub const JOB_RETRY_CREATED: &str = "job_queue_retry_created";
pub const JOB_GET_OR_CREATE_RACE_LOST: &str = "job_queue_get_or_create_race_lost";
pub const CLEANUP_STALE_FOUND: &str = "job_queue_cleanup_stale_found";
pub const CLEANUP_DELETED: &str = "job_queue_cleanup_deleted";
pub const CLEANUP_ERRORS: &str = "job_queue_cleanup_errors";
pub const RESULT_FIELD_COMPRESSED: &str = "job_queue_result_field_compressed";
