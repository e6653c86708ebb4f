pub mod worker;

mod error;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cvdb_service::CvdbService;
use cvdb_storage::{db::Db, qdrant::QdrantStore};

#[derive(Debug, Parser)]
#[command(
	version = cvdb_cli::VERSION,
	rename_all = "kebab",
	styles = cvdb_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = cvdb_config::load(&args.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let qdrant = QdrantStore::new(&config.storage.qdrant)?;

	// Jobs still complete while Qdrant is down; their points are deferred to the outbox.
	if let Err(err) = qdrant.ensure_collection().await {
		tracing::warn!(error = %err, "Qdrant collection check failed. Continuing.");
	}

	let state = worker::WorkerState { service: CvdbService::new(config, db, qdrant) };

	worker::run_worker(state).await
}
