pub type Result<T, E = Error> = std::result::Result<T, E>;

const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";
const PG_CHECK_VIOLATION: &str = "23514";

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Extraction failed: {message}")]
	Extraction { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
}
impl Error {
	/// Whether retrying the same work can succeed. Everything else fails the job for good.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Provider { .. } | Self::Storage { .. } | Self::Qdrant { .. })
	}
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		if let Some(db_err) = err.as_database_error() {
			let message = db_err.message().to_string();

			match db_err.code().as_deref() {
				Some(PG_UNIQUE_VIOLATION) => return Self::Conflict { message },
				Some(PG_FOREIGN_KEY_VIOLATION) => return Self::NotFound { message },
				Some(PG_CHECK_VIOLATION) => return Self::InvalidRequest { message },
				_ => {},
			}
		}

		Self::Storage { message: err.to_string() }
	}
}

impl From<cvdb_storage::Error> for Error {
	fn from(err: cvdb_storage::Error) -> Self {
		match err {
			cvdb_storage::Error::Sqlx(inner) => Self::from(inner),
			cvdb_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			cvdb_storage::Error::NotFound(message) => Self::NotFound { message },
			cvdb_storage::Error::Conflict(message) => Self::Conflict { message },
			cvdb_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
		}
	}
}

impl From<cvdb_providers::Error> for Error {
	fn from(err: cvdb_providers::Error) -> Self {
		match err {
			cvdb_providers::Error::TooLarge { .. } => Self::InvalidRequest { message: err.to_string() },
			other => Self::Provider { message: other.to_string() },
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_backend_failures_are_transient() {
		let message = String::new;

		assert!(Error::Provider { message: message() }.is_transient());
		assert!(Error::Storage { message: message() }.is_transient());
		assert!(Error::Qdrant { message: message() }.is_transient());
		assert!(!Error::Extraction { message: message() }.is_transient());
		assert!(!Error::InvalidRequest { message: message() }.is_transient());
		assert!(!Error::NotFound { message: message() }.is_transient());
		assert!(!Error::Conflict { message: message() }.is_transient());
	}

	#[test]
	fn oversized_downloads_are_rejected_as_invalid() {
		let err = Error::from(cvdb_providers::Error::TooLarge { limit: 10 });

		assert!(matches!(err, Error::InvalidRequest { .. }));
	}

	#[test]
	fn storage_argument_errors_are_invalid_requests() {
		let err = Error::from(cvdb_storage::Error::InvalidArgument("bad".to_string()));

		assert!(matches!(err, Error::InvalidRequest { message } if message == "bad"));
	}
}
