//! Crate-wide error types and `Result` alias.

// std
use std::sync::Arc;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the presign crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error("Required configuration value '{key}' is not set.")]
	Configuration { key: &'static str },
	#[error("Upstream HTTP status {status} from {url}: {body:?}")]
	HttpStatus { status: http::StatusCode, url: url::Url, body: Option<String> },
	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("Parameter '{name}' returned no value.")]
	MissingParameter { name: String },
	#[error("Refresh attempt #{attempt} failed.")]
	Producer {
		attempt: u64,
		#[source]
		source: Arc<Error>,
	},
	#[error("Security violation: {0}")]
	Security(String),
	#[error("Signing failed: {0}")]
	Signing(String),
	#[error("Refresh attempt exceeded {0:?}.")]
	Timeout(std::time::Duration),
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
impl Error {
	/// Unwrap a shared producer failure down to the error raised by the producer itself.
	pub fn root(&self) -> &Error {
		match self {
			Error::Producer { source, .. } => source.root(),
			other => other,
		}
	}
}
