use std::sync::Arc;

use chrono::{Duration, Utc};
use job_core::{
    cleanup::{Cleanup, CleanupConfig},
    events::TracingEventListener,
    retry::ExponentialRetryScheduler,
    types::{JobInit, JobPatch},
    JobManager, JobState, Store,
};
use sqlx::PgPool;

fn manager(db: PgPool) -> JobManager {
    JobManager::new(
        Store::new(db),
        Arc::new(ExponentialRetryScheduler::default()),
        vec![Arc::new(TracingEventListener)],
    )
}

#[sqlx::test(migrations = "./migrations")]
async fn stale_sweep_closes_jobs_past_their_heartbeat(db: PgPool) {
    let mgr = manager(db.clone());
    let store = Store::new(db.clone());

    let j = mgr
        .submit(JobInit {
            command: "stalled".to_string(),
            ..JobInit::default()
        })
        .await
        .unwrap();

    let mut excluded = Vec::new();
    mgr.claim_next("w1", &mut excluded, &[], &[]).await.unwrap();

    job_core::ops::jobs::update_job(
        &db,
        j.id,
        &JobPatch::new().checked_at(Some(Utc::now() - Duration::minutes(10))),
    )
    .await
    .unwrap();

    let manager = Arc::new(mgr);
    let cleanup = Cleanup::new(manager.clone(), store, CleanupConfig::default());

    let status = cleanup.run_once().await;
    assert_eq!(status.last_stale_closed, Some(1));
    assert!(status.stale_job_ids.contains(&j.id));

    let after = job_core::ops::jobs::get_job(&db, j.id).await.unwrap();
    assert_eq!(after.state, JobState::Incomplete);
}

#[sqlx::test(migrations = "./migrations")]
async fn retention_deletes_old_finished_jobs(db: PgPool) {
    let mgr = manager(db.clone());
    let store = Store::new(db.clone());

    let j = mgr
        .submit(JobInit {
            command: "old_finished".to_string(),
            ..JobInit::default()
        })
        .await
        .unwrap();

    mgr.close(j.id, JobState::Finished).await.unwrap();

    job_core::ops::jobs::update_job(
        &db,
        j.id,
        &JobPatch::new().closed_at(Some(Utc::now() - Duration::hours(2))),
    )
    .await
    .unwrap();

    let manager = Arc::new(mgr);
    let cleanup = Cleanup::new(manager, store, CleanupConfig::default());

    let status = cleanup.run_once().await;
    assert_eq!(status.last_deleted_finished, Some(1));

    let row = job_core::ops::jobs::find_job(&db, j.id).await.unwrap();
    assert!(row.is_none());
}
