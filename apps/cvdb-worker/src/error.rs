pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Service(#[from] cvdb_service::Error),
	#[error(transparent)]
	Storage(#[from] cvdb_storage::Error),
}
