use cvdb_service::{Error, IngestOp};

use crate::acceptance as support;

const BODY: &str = "Sam Rivera\nsam@example.com\nData engineer.";

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CVDB_PG_DSN and CVDB_QDRANT_URL to run."]
async fn same_bytes_are_queued_once() {
	let profile = support::profile("Sam Rivera", "sam@example.com", &["Spark"], 5);
	let Some(env) = support::setup("same_bytes_are_queued_once", profile).await else {
		return;
	};
	let service = &env.service;
	let first = service.ingest_upload(support::text_upload(BODY)).await.expect("First upload.");
	let second = service.ingest_upload(support::text_upload(BODY)).await.expect("Second upload.");

	assert_eq!(first.op, IngestOp::Queued);
	assert_eq!(second.op, IngestOp::Duplicate);
	assert_eq!(second.sha256, first.sha256);
	assert_eq!(second.job_id, first.job_id);

	let outcome = support::run_next_job(service).await.expect("Failed to process job.");
	let third = service.ingest_upload(support::text_upload(BODY)).await.expect("Third upload.");

	assert_eq!(third.op, IngestOp::Duplicate);
	assert_eq!(third.resume_file_id, Some(outcome.resume_file_id));
	assert_eq!(third.person_id, Some(outcome.person_id));
	assert_eq!(env.spies.extracts(), 2);

	env.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CVDB_PG_DSN and CVDB_QDRANT_URL to run."]
async fn failed_resume_can_be_uploaded_again() {
	let profile = support::profile("Sam Rivera", "sam@example.com", &["Spark"], 5);
	let Some(env) = support::setup("failed_resume_can_be_uploaded_again", profile).await else {
		return;
	};
	let service = &env.service;
	let person = cvdb_storage::queries::insert_person(
		&service.db.pool,
		"Sam Rivera",
		"sam@example.com",
		None,
		None,
	)
	.await
	.expect("Failed to seed person.");
	let mut upload = support::text_upload(BODY);

	upload.person_id = Some(person.id);

	let first = service.ingest_upload(upload.clone()).await.expect("First upload.");
	let now = time::OffsetDateTime::now_utc();
	let job = support::claim_next_job(service, now).await.expect("Failed to claim job.");

	assert_eq!(Some(job.job_id), first.job_id);
	assert!(
		cvdb_storage::jobs::mark_ingest_job_dead(&service.db, &job, "Extraction failed.", now)
			.await
			.expect("Failed to kill job.")
	);

	let retried = service.ingest_upload(upload).await.expect("Second upload.");

	assert_eq!(retried.op, IngestOp::Queued);
	assert_ne!(retried.job_id, first.job_id);
	assert_ne!(retried.resume_file_id, first.resume_file_id);

	env.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CVDB_PG_DSN and CVDB_QDRANT_URL to run."]
async fn upload_for_unknown_person_is_not_found() {
	let profile = support::profile("Nobody", "nobody@example.com", &[], 0);
	let Some(env) = support::setup("upload_for_unknown_person_is_not_found", profile).await else {
		return;
	};
	let mut upload = support::text_upload(BODY);

	upload.person_id = Some(999_999);

	let err = env.service.ingest_upload(upload).await.expect_err("Expected missing person.");

	assert!(matches!(err, Error::NotFound { .. }), "Unexpected error: {err}");

	env.test_db.cleanup().await.expect("Failed to cleanup test database.");
}
