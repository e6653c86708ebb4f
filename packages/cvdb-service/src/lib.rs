pub mod admin;
pub mod batch;
pub mod ingest;
pub mod persons;
pub mod process;
pub mod search;
pub mod time_serde;

mod error;

pub use admin::RebuildReport;
pub use batch::{BatchItem, IngestBatchResponse, MAX_BATCH_FILES};
pub use error::{Error, Result};
pub use ingest::{
	IngestGdriveRequest, IngestJobResponse, IngestOp, IngestResponse, IngestUploadRequest,
};
pub use persons::{
	DeletePersonResponse, EducationInput, EducationView, PersonPatchRequest, PersonView,
	ResumeFileView,
};
pub use process::ProcessOutcome;
pub use search::{SearchItem, SearchRequest, SearchResponse};

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

use cvdb_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use cvdb_providers::{embedding, extractor, fetch};
use cvdb_storage::{db::Db, qdrant::QdrantStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

pub trait ExtractorProvider
where
	Self: Send + Sync,
{
	fn extract<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<Value>>;
}

/// Retrieves remote resume files, such as Google Drive downloads.
pub trait FetchProvider
where
	Self: Send + Sync,
{
	fn download<'a>(
		&'a self,
		url: &'a str,
		timeout_ms: u64,
		max_bytes: u64,
	) -> BoxFuture<'a, Result<fetch::Downloaded>>;

	/// Fetches a listing page. Providers that only download files refuse.
	fn fetch_page<'a>(
		&'a self,
		_url: &'a str,
		_timeout_ms: u64,
		_max_bytes: u64,
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			Err(Error::Provider { message: "Page fetching is not supported.".to_string() })
		})
	}
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub extractor: Arc<dyn ExtractorProvider>,
	pub fetch: Arc<dyn FetchProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		extractor: Arc<dyn ExtractorProvider>,
		fetch: Arc<dyn FetchProvider>,
	) -> Self {
		Self { embedding, extractor, fetch }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), extractor: provider.clone(), fetch: provider }
	}
}

pub struct CvdbService {
	pub cfg: Config,
	pub db: Db,
	pub qdrant: QdrantStore,
	pub providers: Providers,
}
impl CvdbService {
	pub fn new(cfg: Config, db: Db, qdrant: QdrantStore) -> Self {
		Self { cfg, db, qdrant, providers: Providers::default() }
	}

	pub fn with_providers(cfg: Config, db: Db, qdrant: QdrantStore, providers: Providers) -> Self {
		Self { cfg, db, qdrant, providers }
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(embedding::embed(cfg, texts).await?) })
	}
}
impl ExtractorProvider for DefaultProviders {
	fn extract<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<Value>> {
		Box::pin(async move {
			extractor::extract(cfg, messages).await.map_err(|err| match err {
				// The model answered, just not with usable JSON. Asking again will not help.
				cvdb_providers::Error::InvalidResponse { message } => Error::Extraction { message },
				other => other.into(),
			})
		})
	}
}
impl FetchProvider for DefaultProviders {
	fn download<'a>(
		&'a self,
		url: &'a str,
		timeout_ms: u64,
		max_bytes: u64,
	) -> BoxFuture<'a, Result<fetch::Downloaded>> {
		Box::pin(async move { Ok(fetch::download(url, timeout_ms, max_bytes).await?) })
	}

	fn fetch_page<'a>(
		&'a self,
		url: &'a str,
		timeout_ms: u64,
		max_bytes: u64,
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move { Ok(fetch::fetch_page(url, timeout_ms, max_bytes).await?) })
	}
}

/// Identifies the model that produced a persisted vector, so stale vectors are recomputed.
pub(crate) fn embedding_version(cfg: &Config) -> String {
	format!(
		"{}:{}:{}",
		cfg.providers.embedding.provider_id,
		cfg.providers.embedding.model,
		cfg.storage.qdrant.vector_dim
	)
}
