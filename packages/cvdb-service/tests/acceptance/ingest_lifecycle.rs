use cvdb_service::{Error, IngestOp};
use cvdb_storage::{jobs, queries};

use crate::acceptance::{self as support, VECTOR_DIM};

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CVDB_PG_DSN and CVDB_QDRANT_URL to run."]
async fn uploaded_resume_becomes_a_searchable_person() {
	let profile = support::profile("Jane Doe", "Jane@Example.com", &["Rust", "PostgreSQL"], 7);
	let Some(env) = support::setup("uploaded_resume_becomes_a_searchable_person", profile).await
	else {
		return;
	};
	let service = &env.service;
	let accepted = service
		.ingest_upload(support::text_upload("Jane Doe\njane@example.com\nRust engineer."))
		.await
		.expect("Failed to accept upload.");

	assert_eq!(accepted.op, IngestOp::Queued);
	assert!(accepted.resume_file_id.is_none());

	let outcome = support::run_next_job(service).await.expect("Failed to process job.");

	assert!(outcome.indexed);
	assert_eq!(env.spies.extracts(), 2);
	assert_eq!(env.spies.embeds(), 1);

	let person = service.get_person_by_email("jane@example.com").await.expect("Person missing.");

	assert_eq!(person.id, outcome.person_id);
	assert_eq!(person.full_name, "Jane Doe");

	let resumes = service.list_resume_files(person.id).await.expect("Failed to list resumes.");

	assert_eq!(resumes.len(), 1);
	assert_eq!(resumes[0].status, "SUCCESS");
	assert_eq!(resumes[0].sha256.as_deref(), Some(accepted.sha256.as_str()));

	let educations = service.list_educations(person.id).await.expect("Failed to list educations.");

	assert_eq!(educations.len(), 1);
	assert_eq!(educations[0].institution, "Stanford University");

	let embedding = queries::get_resume_embedding(&service.db.pool, outcome.resume_file_id)
		.await
		.expect("Failed to read embedding.")
		.expect("Embedding was not persisted.");

	assert_eq!(embedding.vec.len(), VECTOR_DIM as usize);
	assert_eq!(support::point_count(service).await, 1);

	let job_id = accepted.job_id.expect("Queued upload has a job.");
	let job = service.ingest_job(job_id).await.expect("Job missing.");

	assert_eq!(job.status, jobs::STATUS_DONE);
	assert_eq!(job.resume_file_id, Some(outcome.resume_file_id));

	env.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CVDB_PG_DSN and CVDB_QDRANT_URL to run."]
async fn replayed_job_does_not_call_providers_again() {
	let profile = support::profile("Ana Lima", "ana@example.com", &["Go"], 3);
	let Some(env) = support::setup("replayed_job_does_not_call_providers_again", profile).await
	else {
		return;
	};
	let service = &env.service;
	let accepted = service
		.ingest_upload(support::text_upload("Ana Lima, Go developer."))
		.await
		.expect("Failed to accept upload.");

	support::run_next_job(service).await.expect("Failed to process job.");

	let job_id = accepted.job_id.expect("Queued upload has a job.");
	let job = jobs::get_ingest_job(&service.db.pool, job_id)
		.await
		.expect("Failed to read job.")
		.expect("Job missing.");
	let outcome = service.process_ingest_job(&job).await.expect("Replay failed.");

	assert!(outcome.indexed);
	assert_eq!(env.spies.extracts(), 2);
	assert_eq!(env.spies.embeds(), 1);

	env.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CVDB_PG_DSN and CVDB_QDRANT_URL to run."]
async fn resume_without_email_fails_extraction() {
	let profile = serde_json::json!({ "name": "No Contact", "skills": ["rust"] });
	let Some(env) = support::setup("resume_without_email_fails_extraction", profile).await else {
		return;
	};
	let service = &env.service;
	let accepted = service
		.ingest_upload(support::text_upload("A resume with no contact details."))
		.await
		.expect("Failed to accept upload.");
	let err = support::run_next_job(service).await.expect_err("Expected extraction failure.");

	assert!(matches!(err, Error::Extraction { .. }), "Unexpected error: {err}");
	assert!(!err.is_transient());

	let job_id = accepted.job_id.expect("Queued upload has a job.");
	let job = service.ingest_job(job_id).await.expect("Job missing.");

	assert_eq!(job.status, jobs::STATUS_CLAIMED);
	assert!(job.person_id.is_none());
	assert_eq!(env.spies.embeds(), 0);

	env.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CVDB_PG_DSN and CVDB_QDRANT_URL to run."]
async fn resume_for_known_person_updates_that_person() {
	let profile = support::profile("Jane Q. Doe", "other@example.com", &["Kotlin"], 9);
	let Some(env) = support::setup("resume_for_known_person_updates_that_person", profile).await
	else {
		return;
	};
	let service = &env.service;
	let person = queries::insert_person(&service.db.pool, "Jane Doe", "jane@example.com", None, None)
		.await
		.expect("Failed to seed person.");
	let mut upload = support::text_upload("Jane Q. Doe, Kotlin.");

	upload.person_id = Some(person.id);

	let accepted = service.ingest_upload(upload).await.expect("Failed to accept upload.");

	assert!(accepted.resume_file_id.is_some());

	let outcome = support::run_next_job(service).await.expect("Failed to process job.");

	assert_eq!(outcome.person_id, person.id);
	assert_eq!(Some(outcome.resume_file_id), accepted.resume_file_id);

	let updated = service.get_person(person.id).await.expect("Person missing.");

	assert_eq!(updated.full_name, "Jane Q. Doe");
	assert_eq!(updated.email, "jane@example.com");

	env.test_db.cleanup().await.expect("Failed to cleanup test database.");
}
