//! Configuration layers two sources: deployment-wide settings come from the
//! environment (database connectivity, pool sizing, bind address), while the
//! cleanup policy itself is tunable per-invocation via CLI flags. Flags
//! always win when both are set, since they're the knob an operator reaches
//! for first when re-running the binary with a different retention window.
use std::time::Duration as StdDuration;

use chrono::Duration;
use clap::Parser;
use envconfig::Envconfig;
use job_core::PoolConfig;

#[derive(Envconfig, Debug, Clone)]
pub struct EnvConfig {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3302")]
    pub port: u16,

    #[envconfig(from = "DATABASE_URL")]
    pub database_url: String,

    #[envconfig(from = "MAX_PG_CONNECTIONS", default = "10")]
    pub max_pg_connections: u32,

    #[envconfig(from = "MIN_PG_CONNECTIONS", default = "1")]
    pub min_pg_connections: u32,
}

impl EnvConfig {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            db_url: self.database_url.clone(),
            max_connections: Some(self.max_pg_connections),
            min_connections: Some(self.min_pg_connections),
            acquire_timeout_seconds: None,
            max_lifetime_seconds: None,
            idle_timeout_seconds: None,
        }
    }
}

/// A `humantime`-parsed duration, so `--max-retention "7 days"` reads the
/// way an operator would type it rather than forcing raw seconds.
#[derive(Debug, Clone, Copy)]
pub struct CliDuration(pub StdDuration);

impl std::str::FromStr for CliDuration {
    type Err = humantime::DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CliDuration(humantime::parse_duration(s)?))
    }
}

impl From<CliDuration> for Duration {
    fn from(value: CliDuration) -> Self {
        Duration::from_std(value.0).unwrap_or(Duration::zero())
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "job-janitor",
    about = "Sweeps stale jobs and prunes closed jobs past their retention window"
)]
pub struct CliArgs {
    /// How long a closed job is kept after it reached a terminal non-success
    /// state (failed, terminated, incomplete, or canceled-unrun).
    #[arg(long = "max-retention", default_value = "7days")]
    pub max_retention: CliDuration,

    /// How long a successfully finished job is kept - shorter than
    /// `max-retention` since there's rarely a reason to dig through a job
    /// that already finished clean.
    #[arg(long = "max-retention-succeeded", default_value = "1hour")]
    pub max_retention_succeeded: CliDuration,

    /// Upper bound on jobs touched (stale-closed plus deleted) in one pass.
    #[arg(long = "per-call", default_value_t = 1000)]
    pub per_call: usize,

    /// How often the cleanup pass runs while this binary is up.
    #[arg(long = "cleanup-interval", default_value = "30s")]
    pub cleanup_interval: CliDuration,
}
