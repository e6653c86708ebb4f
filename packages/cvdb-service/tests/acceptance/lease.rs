use time::{Duration, OffsetDateTime};

use cvdb_service::Error;
use cvdb_storage::jobs;

use crate::acceptance as support;

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CVDB_PG_DSN and CVDB_QDRANT_URL to run."]
async fn reclaimed_job_produces_one_resume() {
	let profile = support::profile("Lee Chen", "lee@example.com", &["Rust"], 4);
	let Some(env) = support::setup("reclaimed_job_produces_one_resume", profile).await else {
		return;
	};
	let service = &env.service;

	service
		.ingest_upload(support::text_upload("Lee Chen, Rust."))
		.await
		.expect("Failed to accept upload.");

	let now = OffsetDateTime::now_utc();
	let lease = Duration::seconds(service.cfg.worker.claim_lease_seconds);
	let stale = support::claim_next_job(service, now).await.expect("Failed to claim job.");
	let current = support::claim_next_job(service, now + lease + Duration::seconds(1))
		.await
		.expect("Expired lease must be claimable.");

	assert_eq!(stale.job_id, current.job_id);

	let err = service.process_ingest_job(&stale).await.expect_err("Stale claim must not run.");

	assert!(matches!(err, Error::Conflict { .. }), "Unexpected error: {err}");
	assert_eq!(env.spies.extracts(), 0);

	let outcome = service.process_ingest_job(&current).await.expect("Failed to process job.");

	// The stale worker coming back after the job finished still writes nothing.
	let err = service.process_ingest_job(&stale).await.expect_err("Stale claim must not run.");

	assert!(matches!(err, Error::Conflict { .. }), "Unexpected error: {err}");
	assert!(
		!jobs::mark_ingest_job_done(&service.db, &stale, OffsetDateTime::now_utc())
			.await
			.expect("Failed to mark job.")
	);
	assert!(
		jobs::mark_ingest_job_done(&service.db, &current, OffsetDateTime::now_utc())
			.await
			.expect("Failed to mark job.")
	);

	let resumes = service
		.list_resume_files(outcome.person_id)
		.await
		.expect("Failed to list resumes.");

	assert_eq!(resumes.len(), 1);
	assert_eq!(env.spies.extracts(), 2);
	assert_eq!(support::point_count(service).await, 1);

	env.test_db.cleanup().await.expect("Failed to cleanup test database.");
}
