use std::sync::Arc;

use cvdb_domain::gdrive;
use cvdb_providers::fetch::Downloaded;
use cvdb_service::{
	BoxFuture, Error, FetchProvider, IngestGdriveRequest, IngestOp, IngestUploadRequest, Result,
};

use crate::acceptance as support;

const FOLDER_ID: &str = "folder_123";
const EMPTY_FOLDER_ID: &str = "folder_empty";

/// Serves a fake public folder listing and its files.
struct DriveFolder;
impl FetchProvider for DriveFolder {
	fn download<'a>(
		&'a self,
		url: &'a str,
		_timeout_ms: u64,
		_max_bytes: u64,
	) -> BoxFuture<'a, Result<Downloaded>> {
		let file_id = url.strip_prefix(gdrive::DOWNLOAD_BASE).unwrap_or_default().to_string();

		Box::pin(async move {
			let bytes = match file_id.as_str() {
				"cv_ana" => b"Ana Ruiz, Rust engineer.".to_vec(),
				"cv_ben" => b"Ben Ode, Go engineer.".to_vec(),
				_ => Vec::new(),
			};

			Ok(Downloaded {
				bytes,
				filename: Some(format!("{file_id}.txt")),
				content_type: Some("text/plain".to_string()),
			})
		})
	}

	fn fetch_page<'a>(
		&'a self,
		url: &'a str,
		_timeout_ms: u64,
		_max_bytes: u64,
	) -> BoxFuture<'a, Result<String>> {
		let page = if url.ends_with(FOLDER_ID) {
			[
				"https://drive.google.com/file/d/cv_ana/view",
				"https://drive.google.com/file/d/cv_ben/view",
				"https://drive.google.com/file/d/cv_blank/view",
				"https://drive.google.com/file/d/cv_ana/view",
			]
			.iter()
			.map(|href| format!(r#"<a href="{href}">resume</a>"#))
			.collect()
		} else {
			"<html><body>Nothing here.</body></html>".to_string()
		};

		Box::pin(async move { Ok(page) })
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CVDB_PG_DSN and CVDB_QDRANT_URL to run."]
async fn upload_batch_reports_each_file() {
	let profile = support::profile("Ana Ruiz", "ana@example.com", &["Rust"], 5);
	let Some(env) = support::setup("upload_batch_reports_each_file", profile).await else {
		return;
	};
	let upload = |name: &str, body: &str| IngestUploadRequest {
		person_id: None,
		filename: Some(name.to_string()),
		bytes: body.as_bytes().to_vec(),
	};
	let report = env
		.service
		.ingest_upload_batch(vec![
			upload("ana.txt", "Ana Ruiz, Rust engineer."),
			upload("ben.txt", "Ben Ode, Go engineer."),
			upload("blank.txt", ""),
			upload("ana_copy.txt", "Ana Ruiz, Rust engineer."),
		])
		.await
		.expect("Batch upload failed.");

	assert_eq!(report.queued_count, 2);
	assert_eq!(report.duplicate_count, 1);
	assert_eq!(report.failed_count, 1);
	assert_eq!(report.items.len(), 4);
	assert_eq!(report.items[2].source, "blank.txt");
	assert!(report.items[2].error.is_some());
	assert_eq!(
		report.items[3].response.as_ref().map(|response| response.op),
		Some(IngestOp::Duplicate)
	);

	let err = env.service.ingest_upload_batch(Vec::new()).await.expect_err("Empty batch.");

	assert!(matches!(err, Error::InvalidRequest { .. }), "Unexpected error: {err}");

	env.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CVDB_PG_DSN and CVDB_QDRANT_URL to run."]
async fn drive_folder_queues_every_listed_file() {
	let profile = support::profile("Ana Ruiz", "ana@example.com", &["Rust"], 5);
	let fetch = Arc::new(DriveFolder);
	let Some(env) =
		support::setup_with_fetch("drive_folder_queues_every_listed_file", profile, fetch).await
	else {
		return;
	};
	let folder = |id: &str| IngestGdriveRequest {
		person_id: None,
		url: format!("https://drive.google.com/drive/folders/{id}?usp=sharing"),
	};
	let report =
		env.service.ingest_gdrive_folder(folder(FOLDER_ID)).await.expect("Folder import failed.");
	let sources: Vec<&str> = report.items.iter().map(|item| item.source.as_str()).collect();

	assert_eq!(sources, vec!["cv_ana", "cv_ben", "cv_blank"]);
	assert_eq!(report.queued_count, 2);
	assert_eq!(report.failed_count, 1);

	let job_id = report.items[0]
		.response
		.as_ref()
		.and_then(|response| response.job_id)
		.expect("Expected a queued job.");
	let job = env.service.ingest_job(job_id).await.expect("Failed to read job.");

	assert_eq!(job.filename.as_deref(), Some("cv_ana.txt"));

	let err = env
		.service
		.ingest_gdrive_folder(folder(EMPTY_FOLDER_ID))
		.await
		.expect_err("Expected an empty folder.");

	assert!(matches!(err, Error::InvalidRequest { .. }), "Unexpected error: {err}");

	let err = env
		.service
		.ingest_gdrive_folder(IngestGdriveRequest {
			person_id: None,
			url: "https://drive.google.com/file/d/cv_ana/view".to_string(),
		})
		.await
		.expect_err("A file link is not a folder.");

	assert!(matches!(err, Error::InvalidRequest { .. }), "Unexpected error: {err}");

	env.test_db.cleanup().await.expect("Failed to cleanup test database.");
}
