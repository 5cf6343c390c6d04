//! # RetryScheduler
//!
//! Computes when a failed job's retry should next become eligible to run.
//! Kept as a trait, rather than a hardcoded formula in `JobManager`, so
//! tests (and deployments with different backoff needs) can swap in a fixed
//! interval or a jittered policy without touching the close cascade.
use chrono::{DateTime, Duration, Utc};

/// Anything that can answer "given this many past attempts, when should the
/// next one run?" is a valid scheduler. Pure and synchronous: it reads no
/// state beyond its arguments, so `schedule_next_retry(now, attempt)` is
/// fully deterministic and needs no database access.
pub trait RetryScheduler: Send + Sync {
    fn schedule_next_retry(&self, now: DateTime<Utc>, attempt: u32) -> DateTime<Utc>;
}

/// `now + base * coefficient^attempt`. The default scheduler: `base` is 5
/// seconds and `coefficient` is 2, matching a standard exponential backoff.
#[derive(Debug, Clone)]
pub struct ExponentialRetryScheduler {
    pub base: Duration,
    pub coefficient: u32,
}

impl ExponentialRetryScheduler {
    pub fn build(base: Duration) -> ExponentialRetrySchedulerBuilder {
        ExponentialRetrySchedulerBuilder::new(base)
    }
}

impl Default for ExponentialRetryScheduler {
    fn default() -> Self {
        ExponentialRetrySchedulerBuilder::default().provide()
    }
}

impl RetryScheduler for ExponentialRetryScheduler {
    fn schedule_next_retry(&self, now: DateTime<Utc>, attempt: u32) -> DateTime<Utc> {
        let factor = self.coefficient.saturating_pow(attempt);
        now + self.base * factor as i32
    }
}

/// Builder pattern struct to provide an `ExponentialRetryScheduler`.
pub struct ExponentialRetrySchedulerBuilder {
    pub base: Duration,
    pub coefficient: u32,
}

impl ExponentialRetrySchedulerBuilder {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            ..Self::default_fields()
        }
    }

    fn default_fields() -> Self {
        Self {
            base: Duration::seconds(5),
            coefficient: 2,
        }
    }

    pub fn coefficient(mut self, coefficient: u32) -> Self {
        self.coefficient = coefficient;
        self
    }

    pub fn provide(&self) -> ExponentialRetryScheduler {
        ExponentialRetryScheduler {
            base: self.base,
            coefficient: self.coefficient,
        }
    }
}

impl Default for ExponentialRetrySchedulerBuilder {
    fn default() -> Self {
        Self::default_fields()
    }
}
