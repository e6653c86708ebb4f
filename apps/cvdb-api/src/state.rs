use std::sync::Arc;

use cvdb_service::CvdbService;
use cvdb_storage::{db::Db, qdrant::QdrantStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<CvdbService>,
}
impl AppState {
	pub async fn new(config: cvdb_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let qdrant = QdrantStore::new(&config.storage.qdrant)?;

		qdrant.ensure_collection().await?;

		Ok(Self::from_service(CvdbService::new(config, db, qdrant)))
	}

	pub fn from_service(service: CvdbService) -> Self {
		Self { service: Arc::new(service) }
	}
}
