use std::sync::{Arc, RwLock};

use axum::{routing::get, Json, Router};
use health::HealthRegistry;
use job_core::CleanupStatus;

pub fn app(liveness: HealthRegistry, status: Arc<RwLock<CleanupStatus>>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || async move { liveness.get_status() }))
        .route(
            "/status",
            get(move || {
                let status = status.clone();
                async move { last_status(status) }
            }),
        )
}

async fn index() -> &'static str {
    "job-janitor"
}

fn last_status(status: Arc<RwLock<CleanupStatus>>) -> Json<CleanupStatus> {
    let snapshot = status
        .read()
        .expect("poisoned cleanup status lock")
        .clone();
    Json(snapshot)
}
