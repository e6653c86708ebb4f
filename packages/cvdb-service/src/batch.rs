//! Multi-file ingestion: several uploads in one request, or every file in a shared Drive folder.
//!
//! Files are accepted one at a time. A file that is rejected is reported next to the others and
//! does not fail the batch.

use serde::{Deserialize, Serialize};

use crate::{
	CvdbService, Error, IngestGdriveRequest, IngestOp, IngestResponse, IngestUploadRequest, Result,
	ingest,
};
use cvdb_domain::gdrive;

pub const MAX_BATCH_FILES: usize = 20;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchItem {
	/// Upload filename, or the Drive file id for folder imports.
	pub source: String,
	pub response: Option<IngestResponse>,
	pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestBatchResponse {
	pub queued_count: usize,
	pub duplicate_count: usize,
	pub failed_count: usize,
	pub items: Vec<BatchItem>,
}
impl IngestBatchResponse {
	fn from_items(items: Vec<BatchItem>) -> Self {
		let mut queued_count = 0;
		let mut duplicate_count = 0;
		let mut failed_count = 0;

		for item in &items {
			match item.response.as_ref().map(|response| response.op) {
				Some(IngestOp::Queued) => queued_count += 1,
				Some(IngestOp::Duplicate) => duplicate_count += 1,
				None => failed_count += 1,
			}
		}

		Self { queued_count, duplicate_count, failed_count, items }
	}
}

impl CvdbService {
	pub async fn ingest_upload_batch(
		&self,
		uploads: Vec<IngestUploadRequest>,
	) -> Result<IngestBatchResponse> {
		check_batch_size(uploads.len())?;

		let mut items = Vec::with_capacity(uploads.len());

		for (idx, upload) in uploads.into_iter().enumerate() {
			let source = upload.filename.clone().unwrap_or_else(|| format!("file {}", idx + 1));
			let result = self.ingest_upload(upload).await;

			items.push(batch_item(source, result));
		}

		Ok(IngestBatchResponse::from_items(items))
	}

	/// Imports every file linked from a folder shared as "anyone with the link".
	pub async fn ingest_gdrive_folder(
		&self,
		req: IngestGdriveRequest,
	) -> Result<IngestBatchResponse> {
		let folder = gdrive::parse_folder_link(&req.url).map_err(ingest::link_error)?;
		let page = self
			.providers
			.fetch
			.fetch_page(
				&folder.listing_url(),
				self.cfg.ingest.download_timeout_ms,
				self.cfg.ingest.max_file_bytes,
			)
			.await?;
		let file_ids = gdrive::listed_file_ids(&page);

		if file_ids.is_empty() {
			return Err(Error::InvalidRequest {
				message: "Google Drive folder lists no files. Share it with anyone who has the link."
					.to_string(),
			});
		}

		check_batch_size(file_ids.len())?;
		tracing::info!(
			folder_id = %folder.folder_id,
			files = file_ids.len(),
			"Listed Google Drive folder."
		);

		let mut items = Vec::with_capacity(file_ids.len());

		for file_id in file_ids {
			let link = gdrive::GdriveLink { file_id };
			let result = self.ingest_drive_file(req.person_id, &link).await;

			items.push(batch_item(link.file_id, result));
		}

		Ok(IngestBatchResponse::from_items(items))
	}
}

fn check_batch_size(len: usize) -> Result<()> {
	if len == 0 {
		return Err(Error::InvalidRequest { message: "No files were provided.".to_string() });
	}
	if len > MAX_BATCH_FILES {
		return Err(Error::InvalidRequest {
			message: format!("A batch holds at most {MAX_BATCH_FILES} files, got {len}."),
		});
	}

	Ok(())
}

fn batch_item(source: String, result: Result<IngestResponse>) -> BatchItem {
	match result {
		Ok(response) => BatchItem { source, response: Some(response), error: None },
		Err(err) => {
			tracing::warn!(source = %source, error = %err, "Batch file was not accepted.");

			BatchItem { source, response: None, error: Some(err.to_string()) }
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn response(op: IngestOp) -> IngestResponse {
		IngestResponse {
			op,
			sha256: "0".repeat(64),
			job_id: None,
			person_id: None,
			resume_file_id: None,
		}
	}

	#[test]
	fn batch_size_is_bounded() {
		assert!(check_batch_size(0).is_err());
		assert!(check_batch_size(1).is_ok());
		assert!(check_batch_size(MAX_BATCH_FILES).is_ok());
		assert!(check_batch_size(MAX_BATCH_FILES + 1).is_err());
	}

	#[test]
	fn report_counts_each_outcome() {
		let items = vec![
			batch_item("a.pdf".to_string(), Ok(response(IngestOp::Queued))),
			batch_item("b.pdf".to_string(), Ok(response(IngestOp::Duplicate))),
			batch_item(
				"c.png".to_string(),
				Err(Error::InvalidRequest { message: "Unsupported document type.".to_string() }),
			),
			batch_item("d.txt".to_string(), Ok(response(IngestOp::Queued))),
		];
		let report = IngestBatchResponse::from_items(items);

		assert_eq!(report.queued_count, 2);
		assert_eq!(report.duplicate_count, 1);
		assert_eq!(report.failed_count, 1);
		assert_eq!(report.items[2].source, "c.png");
		assert_eq!(
			report.items[2].error.as_deref(),
			Some("Invalid request: Unsupported document type.")
		);
	}
}
