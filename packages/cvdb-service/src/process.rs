//! Worker-side processing of one claimed ingest job.
//!
//! Each stage persists its result before the next one starts, so a retried job resumes from the
//! last completed stage instead of calling the providers again.

use time::OffsetDateTime;

use crate::{CvdbService, Error, Result};
use cvdb_domain::{
	profile::{self, CandidateProfile},
	status::ResumeStatus,
};
use cvdb_providers::extractor;
use cvdb_storage::{
	jobs,
	models::{IngestJob, NewEducation},
	outbox,
	qdrant::ResumePoint,
	queries::{self, PersonPatch},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessOutcome {
	pub person_id: i64,
	pub resume_file_id: i64,
	/// False when the vector index write was deferred to the indexing outbox.
	pub indexed: bool,
}

struct IndexInput {
	person_id: i64,
	resume_file_id: i64,
	skills: Vec<String>,
	years_of_experience: i32,
	text: String,
}

impl CvdbService {
	pub async fn process_ingest_job(&self, job: &IngestJob) -> Result<ProcessOutcome> {
		if let Some(resume_file_id) = job.resume_file_id {
			let resume = queries::get_resume_file(&self.db.pool, resume_file_id)
				.await?
				.ok_or_else(|| Error::NotFound {
					message: "Resume file no longer exists.".to_string(),
				})?;

			match ResumeStatus::parse(&resume.status) {
				Some(ResumeStatus::Success) => {
					return Ok(ProcessOutcome {
						person_id: resume.person_id,
						resume_file_id,
						indexed: true,
					});
				},
				Some(ResumeStatus::Error) => {
					return Err(Error::Conflict {
						message: "Resume file has already failed.".to_string(),
					});
				},
				_ => {},
			}
		}

		let input = match self.stored_index_input(job).await? {
			Some(input) => {
				tracing::info!(
					job_id = %job.job_id,
					resume_file_id = input.resume_file_id,
					"Reusing persisted profile."
				);

				input
			},
			None => self.extract_and_store(job).await?,
		};
		let vec = self.resume_vector(input.resume_file_id, &input.text).await?;
		let point = ResumePoint {
			resume_file_id: input.resume_file_id,
			person_id: input.person_id,
			skills: input.skills,
			years_of_experience: input.years_of_experience,
			vec,
		};
		let indexed = match self.qdrant.upsert_resumes(std::slice::from_ref(&point)).await {
			Ok(()) => {
				queries::finish_resume_file(
					&self.db.pool,
					point.resume_file_id,
					ResumeStatus::Success.as_str(),
				)
				.await?;

				true
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					resume_file_id = point.resume_file_id,
					"Qdrant upsert failed. Deferring to the indexing outbox."
				);

				outbox::enqueue_upsert(&self.db.pool, point.resume_file_id).await?;

				false
			},
		};

		tracing::info!(
			job_id = %job.job_id,
			person_id = point.person_id,
			resume_file_id = point.resume_file_id,
			indexed,
			"Ingest job processed."
		);

		Ok(ProcessOutcome { person_id: point.person_id, resume_file_id: point.resume_file_id, indexed })
	}

	async fn stored_index_input(&self, job: &IngestJob) -> Result<Option<IndexInput>> {
		let Some(resume_file_id) = job.resume_file_id else {
			return Ok(None);
		};
		let Some(stored) = queries::get_resume_profile(&self.db.pool, resume_file_id).await? else {
			return Ok(None);
		};
		let Some(resume) = queries::get_resume_file(&self.db.pool, resume_file_id).await? else {
			return Ok(None);
		};
		let summary = queries::get_person(&self.db.pool, resume.person_id)
			.await?
			.and_then(|person| person.summary);
		let profile = CandidateProfile {
			summary,
			skills: stored.skills.0,
			skills_description: stored.skills_description,
			work_description: stored.work_description,
			years_of_experience: stored.years_of_experience,
			..Default::default()
		};

		Ok(Some(IndexInput {
			person_id: resume.person_id,
			resume_file_id,
			text: index_text(&profile)?,
			skills: profile.skills,
			years_of_experience: profile.years_of_experience,
		}))
	}

	async fn extract_and_store(&self, job: &IngestJob) -> Result<IndexInput> {
		if jobs::lock_claimed_ingest_job(&self.db.pool, job).await?.is_none() {
			return Err(lease_lost());
		}

		let text = self.read_resume_text(job).await?;
		let llm = &self.cfg.providers.llm_extractor;
		let extracted =
			self.providers.extractor.extract(llm, &extractor::extraction_messages(&text)).await?;
		let transformed =
			self.providers.extractor.extract(llm, &extractor::transform_messages(&extracted)).await?;
		let profile = CandidateProfile::from_json(&transformed).map_err(|_| Error::Extraction {
			message: "Extractor output is not a JSON object.".to_string(),
		})?;
		let text = index_text(&profile)?;
		let patch = PersonPatch {
			full_name: profile.full_name.as_deref(),
			email: None,
			phone: profile.phone.as_deref(),
			summary: profile.summary.as_deref(),
		};
		let now = OffsetDateTime::now_utc();
		let mut tx = self.db.pool.begin().await?;
		// Held until commit, so a worker that took the job over cannot write alongside us.
		let Some(current) = jobs::lock_claimed_ingest_job(&mut *tx, job).await? else {
			return Err(lease_lost());
		};
		let person = match (job.person_id, profile.email.as_deref()) {
			(Some(person_id), _) => queries::update_person(&mut *tx, person_id, &patch)
				.await?
				.ok_or_else(|| Error::NotFound { message: "Person not found.".to_string() })?,
			(None, Some(email)) => {
				queries::upsert_person_by_email(&mut *tx, email, &patch, &fallback_name(email))
					.await?
			},
			(None, None) => {
				return Err(Error::Extraction {
					message: "Resume has no valid email address.".to_string(),
				});
			},
		};

		if !profile.education.is_empty() {
			let educations: Vec<NewEducation> = profile
				.education
				.iter()
				.map(|entry| NewEducation {
					institution: entry.institution.clone(),
					degree: entry.degree.clone(),
					field: entry.field.clone(),
					start_date: entry.start_date,
					end_date: entry.end_date,
				})
				.collect();

			queries::replace_educations(&mut *tx, person.id, &educations).await?;
		}

		let resume_file_id = match current.resume_file_id {
			Some(resume_file_id) => resume_file_id,
			None =>
				queries::insert_resume_file(
					&mut *tx,
					person.id,
					job.filename.as_deref(),
					&job.sha256,
					&job.storage_url,
				)
				.await?
				.id,
		};
		let extracted_record = serde_json::json!({ "extracted": extracted, "profile": transformed });

		queries::upsert_resume_profile(
			&mut *tx,
			resume_file_id,
			&profile.skills,
			profile.years_of_experience,
			&profile.skills_description,
			&profile.work_description,
			&extracted_record,
		)
		.await?;
		jobs::link_ingest_job(&mut *tx, job.job_id, person.id, resume_file_id, now).await?;

		tx.commit().await?;

		Ok(IndexInput {
			person_id: person.id,
			resume_file_id,
			skills: profile.skills,
			years_of_experience: profile.years_of_experience,
			text,
		})
	}

	async fn read_resume_text(&self, job: &IngestJob) -> Result<String> {
		let bytes = tokio::fs::read(&job.blob_path).await.map_err(|err| match err.kind() {
			std::io::ErrorKind::NotFound =>
				Error::Extraction { message: "Resume blob is missing.".to_string() },
			_ => Error::Storage { message: format!("Failed to read resume blob: {err}.") },
		})?;
		let text = match job.document_kind.as_str() {
			"pdf" => extract_pdf_text(bytes).await?,
			"text" => String::from_utf8(bytes).map_err(|_| Error::Extraction {
				message: "Text resume is not valid UTF-8.".to_string(),
			})?,
			other => {
				return Err(Error::Extraction {
					message: format!("Unsupported document kind {other:?}."),
				});
			},
		};
		let text = text.trim();

		if text.is_empty() {
			return Err(Error::Extraction {
				message: "Document contains no extractable text.".to_string(),
			});
		}

		Ok(profile::truncate_chars(text, self.cfg.ingest.max_text_chars as usize))
	}

	/// Reuses a persisted vector from the current model, otherwise embeds and persists a new one.
	async fn resume_vector(&self, resume_file_id: i64, text: &str) -> Result<Vec<f32>> {
		let version = crate::embedding_version(&self.cfg);
		let dim = self.cfg.storage.qdrant.vector_dim as usize;

		if let Some(stored) = queries::get_resume_embedding(&self.db.pool, resume_file_id).await?
			&& stored.embedding_version == version
			&& stored.vec.len() == dim
		{
			return Ok(stored.vec);
		}

		let texts = vec![text.to_string()];
		let mut vectors =
			self.providers.embedding.embed(&self.cfg.providers.embedding, &texts).await?;

		if vectors.len() != 1 {
			return Err(Error::Provider {
				message: format!("Embedding provider returned {} vectors for 1 text.", vectors.len()),
			});
		}

		let Some(vec) = vectors.pop() else {
			return Err(Error::Provider {
				message: "Embedding provider returned no vector.".to_string(),
			});
		};

		validate_vector(&vec, dim)?;
		queries::upsert_resume_embedding(&self.db.pool, resume_file_id, &version, &vec).await?;

		Ok(vec)
	}
}

async fn extract_pdf_text(bytes: Vec<u8>) -> Result<String> {
	match tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes)).await {
		Ok(Ok(text)) => Ok(text),
		Ok(Err(err)) => Err(Error::Extraction { message: format!("Failed to read PDF: {err}.") }),
		Err(err) => Err(Error::Extraction { message: format!("PDF parser aborted: {err}.") }),
	}
}

/// The text that is embedded for a resume. Falls back to the skill list when the extractor
/// produced no prose.
fn index_text(profile: &CandidateProfile) -> Result<String> {
	let text = profile.embedding_text();

	if !text.is_empty() {
		return Ok(text);
	}
	if !profile.skills.is_empty() {
		return Ok(profile.skills.join(", "));
	}

	Err(Error::Extraction { message: "Extracted profile has nothing to embed.".to_string() })
}

fn validate_vector(vec: &[f32], dim: usize) -> Result<()> {
	if vec.len() != dim {
		return Err(Error::Provider {
			message: format!(
				"Embedding dimension {} does not match configured vector_dim {dim}.",
				vec.len()
			),
		});
	}
	if vec.iter().any(|value| !value.is_finite()) {
		return Err(Error::Provider {
			message: "Embedding contains non-finite values.".to_string(),
		});
	}

	Ok(())
}

fn lease_lost() -> Error {
	Error::Conflict { message: "Ingest job was taken over by another worker.".to_string() }
}

/// Name for a person created from a resume whose name could not be extracted.
fn fallback_name(email: &str) -> String {
	let local = email.split('@').next().unwrap_or(email);

	profile::truncate_chars(local, profile::FULL_NAME_MAX_CHARS)
}
