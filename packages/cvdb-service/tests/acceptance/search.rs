use cvdb_service::{SearchRequest, SearchResponse};

use crate::acceptance::{self as support, Env};

async fn indexed_env(test_name: &str) -> Option<(Env, i64)> {
	let profile = support::profile("Mia Novak", "mia@example.com", &["Rust", "Kafka"], 8);
	let env = support::setup(test_name, profile).await?;

	env.service
		.ingest_upload(support::text_upload("Mia Novak, Rust and Kafka."))
		.await
		.expect("Failed to accept upload.");

	let outcome = support::run_next_job(&env.service).await.expect("Failed to process job.");

	Some((env, outcome.person_id))
}

async fn search(env: &Env, req: SearchRequest) -> SearchResponse {
	env.service.search(req).await.expect("Search failed.")
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CVDB_PG_DSN and CVDB_QDRANT_URL to run."]
async fn search_returns_hydrated_candidate() {
	let Some((env, person_id)) = indexed_env("search_returns_hydrated_candidate").await else {
		return;
	};
	let response = search(
		&env,
		SearchRequest { query: "streaming engineer".to_string(), ..Default::default() },
	)
	.await;

	assert_eq!(response.items.len(), 1);

	let item = &response.items[0];

	assert_eq!(item.person_id, person_id);
	assert_eq!(item.email, "mia@example.com");
	assert_eq!(item.skills, vec!["rust".to_string(), "kafka".to_string()]);
	assert_eq!(item.years_of_experience, Some(8));
	assert_eq!(item.educations.len(), 1);
	assert_eq!(item.filename.as_deref(), Some("resume.txt"));

	env.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CVDB_PG_DSN and CVDB_QDRANT_URL to run."]
async fn search_filters_narrow_candidates() {
	let Some((env, _)) = indexed_env("search_filters_narrow_candidates").await else {
		return;
	};
	let query = || "backend".to_string();
	let by_skill = search(
		&env,
		SearchRequest {
			query: query(),
			skills: Some(vec!["KAFKA".to_string()]),
			..Default::default()
		},
	)
	.await;
	let missing_skill = search(
		&env,
		SearchRequest { query: query(), skills: Some(vec!["cobol".to_string()]), ..Default::default() },
	)
	.await;
	let too_senior =
		search(&env, SearchRequest { query: query(), years_of_experience: Some(9), ..Default::default() })
			.await;
	let by_school = search(
		&env,
		SearchRequest {
			query: query(),
			institution: Some("stanford".to_string()),
			degree: Some("msc".to_string()),
			..Default::default()
		},
	)
	.await;
	let other_school = search(
		&env,
		SearchRequest { query: query(), institution: Some("Oxford".to_string()), ..Default::default() },
	)
	.await;

	assert_eq!(by_skill.items.len(), 1);
	assert!(missing_skill.items.is_empty());
	assert!(too_senior.items.is_empty());
	assert_eq!(by_school.items.len(), 1);
	assert!(other_school.items.is_empty());

	env.test_db.cleanup().await.expect("Failed to cleanup test database.");
}
