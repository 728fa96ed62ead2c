pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Invalid filter at {path}: {message}")]
	InvalidFilter { path: String, message: String },
	#[error("Upstream unavailable: {message}")]
	UpstreamUnavailable { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
}
impl From<sift_domain::FilterError> for Error {
	fn from(err: sift_domain::FilterError) -> Self {
		Self::InvalidFilter { path: err.path, message: err.message }
	}
}
impl From<sift_domain::DateError> for Error {
	fn from(err: sift_domain::DateError) -> Self {
		Self::InvalidRequest { message: err.to_string() }
	}
}
impl From<sift_domain::Error> for Error {
	fn from(err: sift_domain::Error) -> Self {
		match err {
			sift_domain::Error::Filter(inner) => inner.into(),
			sift_domain::Error::Date(inner) => inner.into(),
		}
	}
}
impl From<sift_storage::Error> for Error {
	fn from(err: sift_storage::Error) -> Self {
		match err {
			sift_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			sift_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
			other => Self::Storage { message: other.to_string() },
		}
	}
}
impl From<color_eyre::Report> for Error {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
