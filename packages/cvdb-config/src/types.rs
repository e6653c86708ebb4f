use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub ingest: Ingest,
	pub search: Search,
	pub worker: Worker,
	pub security: Security,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	/// Public API listener.
	pub http_bind: String,
	/// Listener for `/v1/admin/*`. Kept apart so it can stay on loopback.
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	/// Empty means "build from POSTGRES_USER, POSTGRES_PASSWORD, POSTGRES_DB and POSTGRES_HOST".
	#[serde(default)]
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	/// gRPC endpoint, e.g. `http://localhost:6334`.
	pub url: String,
	/// One point per successfully ingested resume.
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub llm_extractor: LlmProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct Ingest {
	/// Uploaded documents are written here under their SHA-256 name until a worker picks them up.
	pub blob_dir: PathBuf,
	/// Upper bound for uploads and Google Drive downloads alike.
	pub max_file_bytes: u64,
	#[serde(default = "default_download_timeout_ms")]
	pub download_timeout_ms: u64,
	/// Characters of document text handed to the extractor.
	#[serde(default = "default_max_text_chars")]
	pub max_text_chars: u32,
}

#[derive(Debug, Deserialize)]
pub struct Search {
	pub default_limit: u32,
	pub max_limit: u32,
	/// Qdrant is asked for `limit * candidate_multiplier` hits so that filtering out stale or
	/// missing persons still leaves a full page.
	pub candidate_multiplier: u32,
}

#[derive(Debug, Deserialize)]
pub struct Worker {
	/// Idle sleep between polls of the ingest queue and the indexing outbox.
	pub poll_interval_ms: u64,
	/// A claimed row becomes claimable again once its lease runs out.
	pub claim_lease_seconds: i64,
	/// Transient failures are retried until this many attempts, then the job is dead.
	pub max_attempts: i32,
	/// DONE and DEAD rows older than this are purged.
	#[serde(default = "default_job_retention_days")]
	pub job_retention_days: i64,
}

#[derive(Debug, Deserialize)]
pub struct Security {
	/// Refuses a non-loopback `http_bind`. The admin listener is loopback-only regardless.
	pub bind_localhost_only: bool,
	pub api_auth_token: Option<String>,
	pub admin_auth_token: Option<String>,
}

fn default_download_timeout_ms() -> u64 {
	30_000
}

fn default_max_text_chars() -> u32 {
	60_000
}

fn default_job_retention_days() -> i64 {
	14
}
