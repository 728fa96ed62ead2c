pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Filter(#[from] FilterError),
	#[error(transparent)]
	Date(#[from] DateError),
}

/// A rejected filter node, addressed by JSON path (e.g. `$.filters[1].field`).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path}: {message}")]
pub struct FilterError {
	pub path: String,
	pub message: String,
}
impl FilterError {
	pub(crate) fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
		Self { path: path.into(), message: message.into() }
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateError {
	#[error("Invalid date '{input}'.")]
	InvalidDate { input: String },
	#[error("Invalid relative date '{input}', expected 'last N day|week|month|year(s)'.")]
	InvalidRelative { input: String },
	#[error("Invalid date range '{input}': {message}")]
	InvalidRange { input: String, message: String },
}
