mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, Ingest, LlmProviderConfig, Postgres, Providers, Qdrant,
	Search, Security, Service, Storage, Worker,
};

use std::{env, fs, path::Path};

const DEFAULT_POSTGRES_HOST: &str = "localhost:5432";

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg, |key| env::var(key).ok());

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in [
		("service.http_bind", &cfg.service.http_bind),
		("service.admin_bind", &cfg.service.admin_bind),
		("storage.postgres.dsn", &cfg.storage.postgres.dsn),
		("storage.qdrant.url", &cfg.storage.qdrant.url),
		("storage.qdrant.collection", &cfg.storage.qdrant.collection),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	if !cfg.providers.llm_extractor.temperature.is_finite()
		|| cfg.providers.llm_extractor.temperature < 0.0
	{
		return Err(Error::Validation {
			message: "providers.llm_extractor.temperature must be a finite number, zero or greater."
				.to_string(),
		});
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("llm_extractor", &cfg.providers.llm_extractor.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	if cfg.ingest.blob_dir.as_os_str().is_empty() {
		return Err(Error::Validation { message: "ingest.blob_dir must be non-empty.".to_string() });
	}
	if cfg.ingest.max_file_bytes == 0 {
		return Err(Error::Validation {
			message: "ingest.max_file_bytes must be greater than zero.".to_string(),
		});
	}
	if cfg.ingest.max_text_chars == 0 {
		return Err(Error::Validation {
			message: "ingest.max_text_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.search.default_limit == 0 {
		return Err(Error::Validation {
			message: "search.default_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.search.max_limit < cfg.search.default_limit {
		return Err(Error::Validation {
			message: "search.max_limit must be greater than or equal to search.default_limit."
				.to_string(),
		});
	}
	if cfg.search.candidate_multiplier == 0 {
		return Err(Error::Validation {
			message: "search.candidate_multiplier must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: "worker.poll_interval_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.claim_lease_seconds <= 0 {
		return Err(Error::Validation {
			message: "worker.claim_lease_seconds must be greater than zero.".to_string(),
		});
	}
	// The lease is renewed while a job runs, but a single provider call must still fit in it.
	for (label, timeout_ms) in [
		("providers.embedding.timeout_ms", cfg.providers.embedding.timeout_ms),
		("providers.llm_extractor.timeout_ms", cfg.providers.llm_extractor.timeout_ms),
		("ingest.download_timeout_ms", cfg.ingest.download_timeout_ms),
	] {
		if (cfg.worker.claim_lease_seconds as u64).saturating_mul(1_000) <= timeout_ms {
			return Err(Error::Validation {
				message: format!("worker.claim_lease_seconds must exceed {label}."),
			});
		}
	}
	if cfg.worker.max_attempts <= 0 {
		return Err(Error::Validation {
			message: "worker.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.job_retention_days <= 0 {
		return Err(Error::Validation {
			message: "worker.job_retention_days must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

/// Builds a DSN the same way the compose file provisions the database.
pub fn postgres_dsn_from_env<F>(lookup: F) -> Option<String>
where
	F: Fn(&str) -> Option<String>,
{
	let user = lookup("POSTGRES_USER").filter(|value| !value.trim().is_empty())?;
	let password = lookup("POSTGRES_PASSWORD").unwrap_or_default();
	let database = lookup("POSTGRES_DB").filter(|value| !value.trim().is_empty())?;
	let host = lookup("POSTGRES_HOST")
		.filter(|value| !value.trim().is_empty())
		.unwrap_or_else(|| DEFAULT_POSTGRES_HOST.to_string());

	if password.is_empty() {
		Some(format!("postgres://{user}@{host}/{database}"))
	} else {
		Some(format!("postgres://{user}:{password}@{host}/{database}"))
	}
}

fn normalize<F>(cfg: &mut Config, lookup: F)
where
	F: Fn(&str) -> Option<String>,
{
	if cfg.storage.postgres.dsn.trim().is_empty()
		&& let Some(dsn) = postgres_dsn_from_env(lookup)
	{
		cfg.storage.postgres.dsn = dsn;
	}
	if cfg.security.api_auth_token.as_deref().map(|token| token.trim().is_empty()).unwrap_or(false)
	{
		cfg.security.api_auth_token = None;
	}
	if cfg
		.security
		.admin_auth_token
		.as_deref()
		.map(|token| token.trim().is_empty())
		.unwrap_or(false)
	{
		cfg.security.admin_auth_token = None;
	}
}
