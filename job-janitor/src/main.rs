//! Standing process that drives `job_core::Cleanup` on an interval and
//! exposes liveness/readiness/metrics over HTTP, the way this codebase's
//! other background-worker binaries do.
use std::sync::{Arc, RwLock};
use std::time::Duration;

use clap::Parser;
use envconfig::Envconfig;
use eyre::Result;
use futures::future::{select, Either};
use health::HealthRegistry;
use job_core::cleanup::CleanupConfig;
use job_core::{Cleanup, JobManager, RetryScheduler, Store, TracingEventListener};

mod config;
mod handlers;

use config::{CliArgs, EnvConfig};

async fn listen(app: axum::Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn cleanup_loop(
    cleanup: Cleanup,
    status: Arc<RwLock<job_core::CleanupStatus>>,
    liveness: health::HealthHandle,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let run = cleanup.run_once().await;
        if run.last_error.is_none() {
            liveness.report_healthy().await;
        } else {
            tracing::warn!(error = ?run.last_error, "cleanup pass reported an error");
        }
        *status.write().expect("poisoned cleanup status lock") = run;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let env_config = EnvConfig::init_from_env().expect("invalid configuration");
    let cli = CliArgs::parse();

    let store = Store::connect(&env_config.pool_config()).await?;
    store.run_migrations().await?;

    let retry_scheduler: Arc<dyn RetryScheduler> =
        Arc::new(job_core::ExponentialRetryScheduler::default());
    let manager = Arc::new(JobManager::new(
        store.clone(),
        retry_scheduler,
        vec![Arc::new(TracingEventListener)],
    ));

    let cleanup_config = CleanupConfig {
        max_retention: cli.max_retention.into(),
        max_retention_succeeded: cli.max_retention_succeeded.into(),
        per_call: cli.per_call,
        ..Default::default()
    };
    let cleanup = Cleanup::new(manager, store, cleanup_config);

    let liveness_registry = HealthRegistry::new("liveness");
    let cleanup_liveness = liveness_registry
        .register("cleanup".to_string(), cli.cleanup_interval.0 * 3)
        .await;

    let status = Arc::new(RwLock::new(job_core::CleanupStatus::default()));

    let cleanup_task = Box::pin(cleanup_loop(
        cleanup,
        status.clone(),
        cleanup_liveness,
        cli.cleanup_interval.0,
    ));

    let router = handlers::app(liveness_registry, status);
    let router = common_metrics::setup_metrics_routes(router);
    let http_server = Box::pin(listen(router, env_config.bind()));

    match select(http_server, cleanup_task).await {
        Either::Left((listen_result, _)) => listen_result,
        Either::Right(((), _)) => {
            tracing::error!("job-janitor cleanup task exited");
            Ok(())
        }
    }
}
