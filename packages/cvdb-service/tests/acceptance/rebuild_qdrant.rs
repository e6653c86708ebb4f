use time::OffsetDateTime;

use cvdb_service::CvdbService;
use cvdb_storage::{
	db::Db,
	jobs, outbox,
	qdrant::{QdrantStore, ResumePoint},
	queries,
};

use crate::acceptance as support;

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CVDB_PG_DSN and CVDB_QDRANT_URL to run."]
async fn rebuild_uses_persisted_vectors_only() {
	let profile = support::profile("Kim Park", "kim@example.com", &["Rust"], 6);
	let Some(env) = support::setup("rebuild_uses_persisted_vectors_only", profile).await else {
		return;
	};
	let service = &env.service;

	service
		.ingest_upload(support::text_upload("Kim Park, Rust."))
		.await
		.expect("Failed to accept upload.");

	let outcome = support::run_next_job(service).await.expect("Failed to process job.");

	service.unproject_person(outcome.person_id).await.expect("Failed to clear points.");

	assert_eq!(support::point_count(service).await, 0);

	let embeds_before = env.spies.embeds();
	let report = service.rebuild_qdrant().await.expect("Rebuild failed.");

	assert_eq!(report.rebuilt_count, 1);
	assert_eq!(report.missing_vector_count, 0);
	assert_eq!(report.error_count, 0);
	assert_eq!(report.orphan_removed_count, 0);
	assert_eq!(env.spies.embeds(), embeds_before);
	assert_eq!(support::point_count(service).await, 1);

	env.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CVDB_PG_DSN and CVDB_QDRANT_URL to run."]
async fn outbox_upsert_completes_a_queued_resume() {
	let profile = support::profile("Kim Park", "kim@example.com", &["Rust"], 6);
	let Some(env) = support::setup("outbox_upsert_completes_a_queued_resume", profile).await else {
		return;
	};
	let service = &env.service;
	let person = queries::insert_person(&service.db.pool, "Kim Park", "kim@example.com", None, None)
		.await
		.expect("Failed to seed person.");
	let resume = queries::insert_resume_file(
		&service.db.pool,
		person.id,
		Some("kim.txt"),
		&"a".repeat(64),
		"file:///tmp/kim.txt",
	)
	.await
	.expect("Failed to seed resume.");
	let err = service.project_resume(resume.id).await.expect_err("Expected missing vector.");

	assert!(!err.is_transient());

	queries::upsert_resume_embedding(
		&service.db.pool,
		resume.id,
		"test:test-embedding:4",
		&support::text_vector("kim", support::VECTOR_DIM),
	)
	.await
	.expect("Failed to seed embedding.");
	outbox::enqueue_upsert(&service.db.pool, resume.id).await.expect("Failed to enqueue.");

	assert!(service.project_resume(resume.id).await.expect("Projection failed."));

	let stored = queries::get_resume_file(&service.db.pool, resume.id)
		.await
		.expect("Failed to read resume.")
		.expect("Resume missing.");

	assert_eq!(stored.status, "SUCCESS");
	assert_eq!(support::point_count(service).await, 1);

	env.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CVDB_PG_DSN and CVDB_QDRANT_URL to run."]
async fn rebuild_removes_points_without_a_live_resume() {
	let profile = support::profile("Kim Park", "kim@example.com", &["Rust"], 6);
	let Some(env) = support::setup("rebuild_removes_points_without_a_live_resume", profile).await
	else {
		return;
	};
	let service = &env.service;

	service
		.ingest_upload(support::text_upload("Kim Park, Rust."))
		.await
		.expect("Failed to accept upload.");
	support::run_next_job(service).await.expect("Failed to process job.");
	service
		.qdrant
		.upsert_resumes(&[ResumePoint {
			resume_file_id: 999_999,
			person_id: 999_999,
			skills: vec!["cobol".to_string()],
			years_of_experience: 1,
			vec: support::text_vector("orphan", support::VECTOR_DIM),
		}])
		.await
		.expect("Failed to seed orphan point.");

	assert_eq!(support::point_count(service).await, 2);

	let report = service.rebuild_qdrant().await.expect("Rebuild failed.");

	assert_eq!(report.rebuilt_count, 1);
	assert_eq!(report.orphan_removed_count, 1);
	assert_eq!(support::point_count(service).await, 1);

	env.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CVDB_PG_DSN and CVDB_QDRANT_URL to run."]
async fn qdrant_outage_defers_projection_to_the_outbox() {
	let profile = support::profile("Kim Park", "kim@example.com", &["Rust"], 6);
	let Some(env) = support::setup("qdrant_outage_defers_projection_to_the_outbox", profile).await
	else {
		return;
	};
	let service = &env.service;
	// Same database, but the collection was never created, so every upsert fails.
	let cfg = cvdb_testkit::test_config(
		env.test_db.dsn(),
		&service.cfg.storage.qdrant.url,
		&format!("{}_missing", service.qdrant.collection),
		support::VECTOR_DIM,
	);
	let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect.");
	let qdrant = QdrantStore::new(&cfg.storage.qdrant).expect("Failed to build Qdrant client.");
	let offline = CvdbService::with_providers(cfg, db, qdrant, service.providers.clone());
	let accepted = service
		.ingest_upload(support::text_upload("Kim Park, Rust."))
		.await
		.expect("Failed to accept upload.");
	let job_id = accepted.job_id.expect("Expected a queued job.");
	let outcome = support::run_next_job(&offline).await.expect("Failed to process job.");

	assert!(!outcome.indexed);

	let resume = queries::get_resume_file(&service.db.pool, outcome.resume_file_id)
		.await
		.expect("Failed to read resume.")
		.expect("Resume missing.");
	let job = jobs::get_ingest_job(&service.db.pool, job_id)
		.await
		.expect("Failed to read job.")
		.expect("Job missing.");

	assert_eq!(resume.status, "QUEUED");
	assert_eq!(job.status, "DONE");
	assert_eq!(support::point_count(service).await, 0);

	let entry = outbox::claim_next_outbox_job(&service.db, OffsetDateTime::now_utc(), 30)
		.await
		.expect("Failed to claim outbox entry.")
		.expect("Expected a deferred upsert.");

	assert_eq!(entry.op, "UPSERT");
	assert_eq!(entry.resume_file_id, Some(outcome.resume_file_id));
	assert!(service.project_resume(outcome.resume_file_id).await.expect("Projection failed."));

	outbox::mark_outbox_done(&service.db, entry.outbox_id, OffsetDateTime::now_utc())
		.await
		.expect("Failed to finish outbox entry.");

	let resume = queries::get_resume_file(&service.db.pool, outcome.resume_file_id)
		.await
		.expect("Failed to read resume.")
		.expect("Resume missing.");

	assert_eq!(resume.status, "SUCCESS");
	assert_eq!(support::point_count(service).await, 1);
	assert_eq!(env.spies.embeds(), 1);

	env.test_db.cleanup().await.expect("Failed to cleanup test database.");
}
