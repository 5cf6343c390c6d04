use std::sync::Arc;

use job_core::{
    events::TracingEventListener, retry::ExponentialRetryScheduler, types::JobInit, JobManager,
    JobState, Store,
};
use sqlx::PgPool;

fn manager(db: PgPool) -> JobManager {
    JobManager::new(
        Store::new(db),
        Arc::new(ExponentialRetryScheduler::default()),
        vec![Arc::new(TracingEventListener)],
    )
}

fn init(command: &str) -> JobInit {
    JobInit {
        command: command.to_string(),
        ..JobInit::default()
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn simple_success(db: PgPool) {
    let mgr = manager(db);

    mgr.submit(init("echo")).await.expect("submit failed");

    let mut excluded = Vec::new();
    let job = mgr
        .claim_next("w1", &mut excluded, &[], &[])
        .await
        .expect("claim failed")
        .expect("expected a claimable job");

    assert_eq!(job.worker_name.as_deref(), Some("w1"));
    assert_eq!(job.state, JobState::Running);

    mgr.close(job.id, JobState::Finished)
        .await
        .expect("close failed");

    let closed = mgr.find(&job.command, &job.args).await.unwrap().unwrap();
    assert_eq!(closed.state, JobState::Finished);
    assert!(closed.closed_at.is_some());

    let mut excluded = Vec::new();
    assert!(mgr
        .claim_next("w1", &mut excluded, &[], &[])
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn retry_then_succeed(db: PgPool) {
    let mgr = manager(db);

    let submitted = mgr
        .submit(JobInit {
            command: "flaky".to_string(),
            max_retries: 2,
            ..JobInit::default()
        })
        .await
        .unwrap();

    let mut excluded = Vec::new();
    let claimed = mgr
        .claim_next("w1", &mut excluded, &[], &[])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.id, submitted.id);

    mgr.close(claimed.id, JobState::Failed).await.unwrap();

    let original_after_fail = mgr.find("flaky", &[]).await.unwrap().unwrap();
    assert_ne!(
        original_after_fail.state,
        JobState::Failed,
        "original should still be awaiting its retry"
    );

    // The retry scheduler backs off ~5s, so it isn't due for claim_next yet;
    // fetch it directly to verify it was created correctly.
    let original_job_id = submitted.id;
    let retry = sqlx::query_as::<_, job_core::Job>(
        "SELECT * FROM jobs WHERE original_job_id = $1",
    )
    .bind(original_job_id)
    .fetch_one(mgr.store().pool())
    .await
    .unwrap();

    assert!(retry.is_retry_job);
    assert_eq!(retry.original_job_id, Some(original_job_id));
    assert_eq!(retry.state, JobState::Pending);

    mgr.close(retry.id, JobState::Finished).await.unwrap();

    let retry_after = sqlx::query_as::<_, job_core::Job>("SELECT * FROM jobs WHERE id = $1")
        .bind(retry.id)
        .fetch_one(mgr.store().pool())
        .await
        .unwrap();
    assert_eq!(retry_after.state, JobState::Finished);

    let original_after_finish = mgr.find("flaky", &[]).await.unwrap().unwrap();
    assert_eq!(original_after_finish.state, JobState::Finished);
}

#[sqlx::test(migrations = "./migrations")]
async fn retry_exhaustion_cancels_dependents(db: PgPool) {
    let mgr = manager(db);

    let j = mgr
        .submit(JobInit {
            command: "flaky".to_string(),
            max_retries: 1,
            ..JobInit::default()
        })
        .await
        .unwrap();

    let d = mgr
        .submit(JobInit {
            command: "downstream".to_string(),
            dependencies: vec![j.id],
            ..JobInit::default()
        })
        .await
        .unwrap();

    mgr.close(j.id, JobState::Failed).await.unwrap();

    let retry = sqlx::query_as::<_, job_core::Job>("SELECT * FROM jobs WHERE original_job_id = $1")
        .bind(j.id)
        .fetch_one(mgr.store().pool())
        .await
        .unwrap();

    mgr.close(retry.id, JobState::Failed).await.unwrap();

    let j_final = sqlx::query_as::<_, job_core::Job>("SELECT * FROM jobs WHERE id = $1")
        .bind(j.id)
        .fetch_one(mgr.store().pool())
        .await
        .unwrap();
    assert_eq!(j_final.state, JobState::Failed);

    let d_final = sqlx::query_as::<_, job_core::Job>("SELECT * FROM jobs WHERE id = $1")
        .bind(d.id)
        .fetch_one(mgr.store().pool())
        .await
        .unwrap();
    assert_eq!(d_final.state, JobState::Canceled);
}

#[sqlx::test(migrations = "./migrations")]
async fn get_or_create_returns_same_job_for_same_command_args(db: PgPool) {
    let mgr = manager(db);

    let args = vec!["a".to_string(), "b".to_string()];
    let first = mgr.get_or_create("dedupe", &args).await.unwrap();
    let second = mgr.get_or_create("dedupe", &args).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.state, JobState::Pending);

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM jobs WHERE command = 'dedupe'")
        .fetch_one(mgr.store().pool())
        .await
        .unwrap();
    assert_eq!(count.0, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn priority_ordering(db: PgPool) {
    let mgr = manager(db);

    let a = mgr
        .submit(JobInit {
            command: "a".to_string(),
            priority: 0,
            ..JobInit::default()
        })
        .await
        .unwrap();
    let b = mgr
        .submit(JobInit {
            command: "b".to_string(),
            priority: -5,
            ..JobInit::default()
        })
        .await
        .unwrap();
    let c = mgr
        .submit(JobInit {
            command: "c".to_string(),
            priority: 0,
            ..JobInit::default()
        })
        .await
        .unwrap();

    let mut excluded = Vec::new();
    let first = mgr.claim_next("w1", &mut excluded, &[], &[]).await.unwrap().unwrap();
    let second = mgr.claim_next("w1", &mut excluded, &[], &[]).await.unwrap().unwrap();
    let third = mgr.claim_next("w1", &mut excluded, &[], &[]).await.unwrap().unwrap();

    assert_eq!(first.id, b.id);
    assert_eq!(second.id, a.id);
    assert_eq!(third.id, c.id);
}

#[sqlx::test(migrations = "./migrations")]
async fn close_is_idempotent_once_terminal(db: PgPool) {
    let mgr = manager(db);
    let j = mgr.submit(init("idempotent")).await.unwrap();

    let mut excluded = Vec::new();
    mgr.claim_next("w1", &mut excluded, &[], &[]).await.unwrap();

    mgr.close(j.id, JobState::Finished).await.unwrap();
    mgr.close(j.id, JobState::Finished).await.unwrap();
    mgr.close(j.id, JobState::Failed).await.unwrap();

    let after = sqlx::query_as::<_, job_core::Job>("SELECT * FROM jobs WHERE id = $1")
        .bind(j.id)
        .fetch_one(mgr.store().pool())
        .await
        .unwrap();
    assert_eq!(after.state, JobState::Finished);
}

#[sqlx::test(migrations = "./migrations")]
async fn close_rejects_non_terminal_target_state(db: PgPool) {
    let mgr = manager(db);
    let j = mgr.submit(init("rejected")).await.unwrap();

    let err = mgr.close(j.id, JobState::Pending).await.unwrap_err();
    assert!(matches!(err, job_core::JobError::InvalidState { .. }));
}

#[sqlx::test(migrations = "./migrations")]
async fn dependent_job_not_startable_until_dependency_finishes(db: PgPool) {
    let mgr = manager(db);

    let upstream = mgr.submit(init("upstream")).await.unwrap();
    mgr.submit(JobInit {
        command: "downstream".to_string(),
        dependencies: vec![upstream.id],
        ..JobInit::default()
    })
    .await
    .unwrap();

    // downstream starts NEW (non-empty dependencies), so it isn't even a
    // PENDING candidate yet.
    let mut excluded = Vec::new();
    let claimed = mgr
        .claim_next("w1", &mut excluded, &[], &[])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.id, upstream.id);

    let mut excluded = Vec::new();
    assert!(mgr
        .claim_next("w1", &mut excluded, &[], &[])
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn excluded_queues_and_restricted_queues_filter_candidates(db: PgPool) {
    let mgr = manager(db);

    mgr.submit(JobInit {
        command: "a".to_string(),
        queue: "q1".to_string(),
        ..JobInit::default()
    })
    .await
    .unwrap();
    mgr.submit(JobInit {
        command: "b".to_string(),
        queue: "q2".to_string(),
        ..JobInit::default()
    })
    .await
    .unwrap();

    let mut excluded = Vec::new();
    let job = mgr
        .claim_next("w1", &mut excluded, &["q1".to_string()], &[])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.queue, "q2");

    let mut excluded = Vec::new();
    let job = mgr
        .claim_next("w2", &mut excluded, &[], &["q1".to_string()])
        .await
        .unwrap();
    assert!(job.is_none(), "q1's only job was already claimed above");
}

#[sqlx::test(migrations = "./migrations")]
async fn list_queues_and_available_count(db: PgPool) {
    let mgr = manager(db);

    mgr.submit(JobInit {
        command: "a".to_string(),
        queue: "alpha".to_string(),
        ..JobInit::default()
    })
    .await
    .unwrap();
    mgr.submit(JobInit {
        command: "b".to_string(),
        queue: "beta".to_string(),
        ..JobInit::default()
    })
    .await
    .unwrap();

    let mut queues = mgr.list_queues().await.unwrap();
    queues.sort();
    assert_eq!(queues, vec!["alpha".to_string(), "beta".to_string()]);

    assert_eq!(mgr.available_count("alpha").await.unwrap(), 1);
    assert_eq!(mgr.available_count("missing").await.unwrap(), 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn record_result_round_trips_through_compression(db: PgPool) {
    let mgr = manager(db);

    let job = mgr.submit(init("echo")).await.unwrap();

    mgr.record_result(
        job.id,
        Some("stdout from the job".to_string()),
        Some("stderr from the job".to_string()),
        Some(0),
    )
    .await
    .expect("record_result failed");

    assert_eq!(
        mgr.job_output(job.id).await.unwrap(),
        Some("stdout from the job".to_string())
    );
    assert_eq!(
        mgr.job_error_output(job.id).await.unwrap(),
        Some("stderr from the job".to_string())
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn job_output_is_none_before_any_result_is_recorded(db: PgPool) {
    let mgr = manager(db);

    let job = mgr.submit(init("echo")).await.unwrap();

    assert_eq!(mgr.job_output(job.id).await.unwrap(), None);
    assert_eq!(mgr.job_error_output(job.id).await.unwrap(), None);
}

#[sqlx::test(migrations = "./migrations")]
async fn attach_related_entity_rejects_invalid_identifiers(db: PgPool) {
    let mgr = manager(db);

    let job = mgr.submit(init("echo")).await.unwrap();

    assert!(mgr
        .attach_related_entity(job.id, "", &serde_json::json!({"id": "123"}))
        .await
        .is_err());

    assert!(mgr
        .attach_related_entity(job.id, "order", &serde_json::json!("not-an-object"))
        .await
        .is_err());

    assert!(mgr
        .attach_related_entity(job.id, "order", &serde_json::json!({}))
        .await
        .is_err());

    mgr.attach_related_entity(job.id, "order", &serde_json::json!({"id": "123"}))
        .await
        .expect("valid related entity should be accepted");
}
