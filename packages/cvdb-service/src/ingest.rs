use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{CvdbService, Error, Result};
use cvdb_domain::{
	document::{self, DocumentKind},
	gdrive, hash,
};
use cvdb_storage::{
	jobs,
	models::{IngestJob, NewIngestJob},
	queries,
};

#[derive(Clone, Debug)]
pub struct IngestUploadRequest {
	/// Attach the resume to an existing person instead of resolving one from the extracted email.
	pub person_id: Option<i64>,
	pub filename: Option<String>,
	pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestGdriveRequest {
	#[serde(default)]
	pub person_id: Option<i64>,
	pub url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestOp {
	Queued,
	Duplicate,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestResponse {
	pub op: IngestOp,
	pub sha256: String,
	pub job_id: Option<Uuid>,
	pub person_id: Option<i64>,
	pub resume_file_id: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestJobResponse {
	pub job_id: Uuid,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub person_id: Option<i64>,
	pub resume_file_id: Option<i64>,
	pub resume_status: Option<String>,
	pub filename: Option<String>,
	pub sha256: String,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
}

struct AcceptedFile {
	person_id: Option<i64>,
	filename: Option<String>,
	bytes: Vec<u8>,
	kind: DocumentKind,
	storage_url: Option<String>,
}

impl CvdbService {
	pub async fn ingest_upload(&self, req: IngestUploadRequest) -> Result<IngestResponse> {
		let filename = req.filename.as_deref().and_then(document::sanitize_filename);
		let kind = self.validate_document(&req.bytes, filename.as_deref())?;

		self.accept(AcceptedFile {
			person_id: req.person_id,
			filename,
			bytes: req.bytes,
			kind,
			storage_url: None,
		})
		.await
	}

	pub async fn ingest_gdrive(&self, req: IngestGdriveRequest) -> Result<IngestResponse> {
		let link = gdrive::parse_link(&req.url).map_err(link_error)?;

		self.ingest_drive_file(req.person_id, &link).await
	}

	pub(crate) async fn ingest_drive_file(
		&self,
		person_id: Option<i64>,
		link: &gdrive::GdriveLink,
	) -> Result<IngestResponse> {
		let download_url = link.download_url();
		let downloaded = self
			.providers
			.fetch
			.download(
				&download_url,
				self.cfg.ingest.download_timeout_ms,
				self.cfg.ingest.max_file_bytes,
			)
			.await?;
		let filename = downloaded
			.filename
			.as_deref()
			.and_then(document::sanitize_filename)
			.or_else(|| fallback_filename(&link.file_id, downloaded.content_type.as_deref()));
		let kind = self.validate_document(&downloaded.bytes, filename.as_deref())?;

		tracing::info!(
			file_id = %link.file_id,
			bytes = downloaded.bytes.len(),
			"Downloaded Google Drive file."
		);

		self.accept(AcceptedFile {
			person_id,
			filename,
			bytes: downloaded.bytes,
			kind,
			storage_url: Some(download_url),
		})
		.await
	}

	pub async fn ingest_job(&self, job_id: Uuid) -> Result<IngestJobResponse> {
		let job = jobs::get_ingest_job(&self.db.pool, job_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: "Ingest job not found.".to_string() })?;
		let resume_status = match job.resume_file_id {
			Some(resume_file_id) => queries::get_resume_file(&self.db.pool, resume_file_id)
				.await?
				.map(|resume| resume.status),
			None => None,
		};

		Ok(job_response(job, resume_status))
	}

	fn validate_document(&self, bytes: &[u8], filename: Option<&str>) -> Result<DocumentKind> {
		if bytes.is_empty() {
			return Err(Error::InvalidRequest { message: "File is empty.".to_string() });
		}
		if bytes.len() as u64 > self.cfg.ingest.max_file_bytes {
			return Err(Error::InvalidRequest {
				message: format!(
					"File exceeds the {} byte limit.",
					self.cfg.ingest.max_file_bytes
				),
			});
		}

		let kind = document::detect(bytes, filename).ok_or_else(|| Error::InvalidRequest {
			message: "Unsupported document type. Upload a PDF or plain text file.".to_string(),
		})?;

		if kind == DocumentKind::Text && std::str::from_utf8(bytes).is_err() {
			return Err(Error::InvalidRequest {
				message: "Text files must be UTF-8 encoded.".to_string(),
			});
		}

		Ok(kind)
	}

	async fn accept(&self, file: AcceptedFile) -> Result<IngestResponse> {
		let sha256 = hash::sha256_hex(&file.bytes);
		let mut tx = self.db.pool.begin().await?;

		queries::lock_sha256(&mut *tx, &sha256).await?;

		if let Some(existing) = queries::find_live_resume_by_sha256(&mut *tx, &sha256).await? {
			tx.commit().await?;
			tracing::info!(
				sha256 = %sha256,
				resume_file_id = existing.id,
				"Duplicate resume ignored."
			);

			return Ok(IngestResponse {
				op: IngestOp::Duplicate,
				sha256,
				job_id: None,
				person_id: Some(existing.person_id),
				resume_file_id: Some(existing.id),
			});
		}
		if let Some(job) = jobs::find_live_job_by_sha256(&mut *tx, &sha256).await? {
			tx.commit().await?;
			tracing::info!(sha256 = %sha256, job_id = %job.job_id, "Resume is already queued.");

			return Ok(IngestResponse {
				op: IngestOp::Duplicate,
				sha256,
				job_id: Some(job.job_id),
				person_id: job.person_id,
				resume_file_id: job.resume_file_id,
			});
		}
		if let Some(person_id) = file.person_id
			&& queries::get_person(&mut *tx, person_id).await?.is_none()
		{
			return Err(Error::NotFound { message: "Person not found.".to_string() });
		}

		let blob_path =
			write_blob(&self.cfg.ingest.blob_dir, &sha256, file.kind, &file.bytes).await?;
		let storage_url =
			file.storage_url.unwrap_or_else(|| format!("file://{}", blob_path.display()));
		let resume_file_id = match file.person_id {
			Some(person_id) => Some(
				queries::insert_resume_file(
					&mut *tx,
					person_id,
					file.filename.as_deref(),
					&sha256,
					&storage_url,
				)
				.await?
				.id,
			),
			None => None,
		};
		let job = NewIngestJob {
			job_id: Uuid::new_v4(),
			person_id: file.person_id,
			resume_file_id,
			filename: file.filename,
			sha256: sha256.clone(),
			storage_url,
			blob_path: blob_path.to_string_lossy().into_owned(),
			document_kind: file.kind.as_str().to_string(),
		};

		jobs::enqueue_ingest_job(&mut *tx, &job).await?;

		tx.commit().await?;

		tracing::info!(
			job_id = %job.job_id,
			sha256 = %sha256,
			person_id = ?file.person_id,
			resume_file_id = ?resume_file_id,
			"Resume queued for ingestion."
		);

		Ok(IngestResponse {
			op: IngestOp::Queued,
			sha256,
			job_id: Some(job.job_id),
			person_id: file.person_id,
			resume_file_id,
		})
	}
}

/// Blobs are content addressed, so rewriting an existing path stores the same bytes.
async fn write_blob(
	blob_dir: &Path,
	sha256: &str,
	kind: DocumentKind,
	bytes: &[u8],
) -> Result<PathBuf> {
	let path = blob_dir.join(format!("{sha256}.{}", kind.extension()));
	let partial = blob_dir.join(format!("{sha256}.{}.partial", Uuid::new_v4().simple()));

	tokio::fs::create_dir_all(blob_dir).await.map_err(blob_error)?;
	tokio::fs::write(&partial, bytes).await.map_err(blob_error)?;
	tokio::fs::rename(&partial, &path).await.map_err(blob_error)?;

	Ok(path)
}

fn blob_error(err: std::io::Error) -> Error {
	Error::Storage { message: format!("Failed to write resume blob: {err}.") }
}

/// Drive downloads often omit a filename; plain text is still recognisable by content type.
fn fallback_filename(file_id: &str, content_type: Option<&str>) -> Option<String> {
	let content_type = content_type?.to_ascii_lowercase();

	if content_type.starts_with("application/pdf") {
		Some(format!("{file_id}.pdf"))
	} else if content_type.starts_with("text/plain") || content_type.starts_with("text/markdown") {
		Some(format!("{file_id}.txt"))
	} else {
		None
	}
}

pub(crate) fn link_error(err: gdrive::GdriveLinkError) -> Error {
	let message = match err {
		gdrive::GdriveLinkError::NotGoogleDrive => "url is not a Google Drive link.",
		gdrive::GdriveLinkError::MissingFileId => "url does not name a Google Drive file.",
		gdrive::GdriveLinkError::MissingFolderId => "url does not name a Google Drive folder.",
	};

	Error::InvalidRequest { message: message.to_string() }
}

fn job_response(job: IngestJob, resume_status: Option<String>) -> IngestJobResponse {
	IngestJobResponse {
		job_id: job.job_id,
		status: job.status,
		attempts: job.attempts,
		last_error: job.last_error,
		person_id: job.person_id,
		resume_file_id: job.resume_file_id,
		resume_status,
		filename: job.filename,
		sha256: job.sha256,
		created_at: job.created_at,
		updated_at: job.updated_at,
	}
}
