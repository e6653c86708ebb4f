use serde_json::Value;
use sqlx::types::Json;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Person {
	pub id: i64,
	pub full_name: String,
	pub email: String,
	pub phone: Option<String>,
	pub summary: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Education {
	pub id: i64,
	pub person_id: i64,
	pub institution: String,
	pub degree: Option<String>,
	pub field: Option<String>,
	pub start_date: Option<Date>,
	pub end_date: Option<Date>,
}

#[derive(Debug, Clone)]
pub struct NewEducation {
	pub institution: String,
	pub degree: Option<String>,
	pub field: Option<String>,
	pub start_date: Option<Date>,
	pub end_date: Option<Date>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResumeFile {
	pub id: i64,
	pub person_id: i64,
	pub filename: Option<String>,
	pub sha256: Option<String>,
	pub storage_url: Option<String>,
	pub status: String,
}

/// Fields the embedding is derived from, kept so the vector index can be rebuilt.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResumeProfile {
	pub resume_file_id: i64,
	pub skills: Json<Vec<String>>,
	pub years_of_experience: i32,
	pub skills_description: String,
	pub work_description: String,
	pub extracted: Value,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResumeEmbedding {
	pub resume_file_id: i64,
	pub embedding_version: String,
	pub embedding_dim: i32,
	pub vec: Vec<f32>,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IngestJob {
	pub job_id: Uuid,
	pub person_id: Option<i64>,
	pub resume_file_id: Option<i64>,
	pub filename: Option<String>,
	pub sha256: String,
	pub storage_url: String,
	pub blob_path: String,
	pub document_kind: String,
	pub status: String,
	/// Claims made so far, including the current one.
	pub attempts: i32,
	/// Set by each claim. Only the holder of the current token may finish the job.
	pub claim_token: Option<Uuid>,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewIngestJob {
	pub job_id: Uuid,
	pub person_id: Option<i64>,
	pub resume_file_id: Option<i64>,
	pub filename: Option<String>,
	pub sha256: String,
	pub storage_url: String,
	pub blob_path: String,
	pub document_kind: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IndexingOutboxEntry {
	pub outbox_id: Uuid,
	pub op: String,
	pub resume_file_id: Option<i64>,
	pub person_id: Option<i64>,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// One hydrated search candidate: a `SUCCESS` resume joined with its owner and profile.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CandidateRow {
	pub resume_file_id: i64,
	pub filename: Option<String>,
	pub person_id: i64,
	pub full_name: String,
	pub email: String,
	pub phone: Option<String>,
	pub summary: Option<String>,
	pub skills: Option<Json<Vec<String>>>,
	pub years_of_experience: Option<i32>,
}

/// A `SUCCESS` resume with whatever is persisted for re-projection.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectionRow {
	pub resume_file_id: i64,
	pub person_id: i64,
	pub skills: Option<Json<Vec<String>>>,
	pub years_of_experience: Option<i32>,
	pub vec: Option<Vec<f32>>,
}
