use time::OffsetDateTime;

use cvdb_service::Error;
use cvdb_storage::{outbox, queries};

use crate::acceptance as support;

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CVDB_PG_DSN and CVDB_QDRANT_URL to run."]
async fn deleting_a_person_removes_rows_and_points() {
	let profile = support::profile("Lee Chen", "lee@example.com", &["Python"], 4);
	let Some(env) = support::setup("deleting_a_person_removes_rows_and_points", profile).await
	else {
		return;
	};
	let service = &env.service;

	service
		.ingest_upload(support::text_upload("Lee Chen, Python."))
		.await
		.expect("Failed to accept upload.");

	let outcome = support::run_next_job(service).await.expect("Failed to process job.");

	assert_eq!(support::point_count(service).await, 1);

	let deleted = service.delete_person(outcome.person_id).await.expect("Failed to delete.");

	assert!(deleted.deleted);

	let err = service.get_person(outcome.person_id).await.expect_err("Person still exists.");

	assert!(matches!(err, Error::NotFound { .. }));
	assert!(
		queries::get_resume_file(&service.db.pool, outcome.resume_file_id)
			.await
			.expect("Failed to read resume.")
			.is_none()
	);

	let entry = outbox::claim_next_outbox_job(&service.db, OffsetDateTime::now_utc(), 30)
		.await
		.expect("Failed to claim outbox entry.")
		.expect("Delete was not queued.");

	assert_eq!(entry.op, outbox::OP_DELETE);
	assert_eq!(entry.person_id, Some(outcome.person_id));

	service.unproject_person(outcome.person_id).await.expect("Failed to remove points.");
	outbox::mark_outbox_done(&service.db, entry.outbox_id, OffsetDateTime::now_utc())
		.await
		.expect("Failed to finish outbox entry.");

	assert_eq!(support::point_count(service).await, 0);

	let again = service.delete_person(outcome.person_id).await.expect_err("Expected not found.");

	assert!(matches!(again, Error::NotFound { .. }));

	env.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CVDB_PG_DSN and CVDB_QDRANT_URL to run."]
async fn projecting_a_deleted_resume_is_a_no_op() {
	let profile = support::profile("Lee Chen", "lee@example.com", &["Python"], 4);
	let Some(env) = support::setup("projecting_a_deleted_resume_is_a_no_op", profile).await else {
		return;
	};
	let projected = env.service.project_resume(424_242).await.expect("Projection failed.");

	assert!(!projected);

	env.test_db.cleanup().await.expect("Failed to cleanup test database.");
}
