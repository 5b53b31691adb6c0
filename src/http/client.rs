//! HTTP client integration for AWS JSON APIs.

// crates.io
use reqwest::{Client, RequestBuilder, StatusCode, redirect::Policy};
use serde::de::DeserializeOwned;
use url::Url;
// self
use crate::_prelude::*;

/// Largest response body accepted from an upstream API.
pub const MAX_RESPONSE_BYTES: usize = 64 * 1024;

/// Build the shared reqwest client used for upstream calls.
pub fn build_client() -> Result<Client> {
	let client = Client::builder()
		.redirect(Policy::none())
		.user_agent(format!("stable-presign/{}", env!("CARGO_PKG_VERSION")))
		.connect_timeout(Duration::from_secs(5))
		.build()?;

	Ok(client)
}

/// Send a prepared request and decode a JSON response body.
///
/// Non-success statuses become [`Error::HttpStatus`] carrying the response body for diagnostics.
pub async fn send_json<T>(builder: RequestBuilder, url: &Url, timeout: Duration) -> Result<T>
where
	T: DeserializeOwned,
{
	let started = Instant::now();
	let response = builder.timeout(timeout).send().await?;
	let status = response.status();

	if !status.is_success() {
		let body = response.text().await.ok();

		return Err(Error::HttpStatus { status, url: url.clone(), body });
	}

	let bytes = response.bytes().await?;

	if bytes.len() > MAX_RESPONSE_BYTES {
		return Err(Error::Validation {
			field: "response",
			reason: format!(
				"Response size {size} bytes exceeds the guard of {MAX_RESPONSE_BYTES} bytes.",
				size = bytes.len()
			),
		});
	}

	tracing::debug!(%url, %status, elapsed = ?started.elapsed(), "upstream call complete");

	Ok(serde_json::from_slice(&bytes)?)
}

/// Whether a failed call is worth retrying.
///
/// Transport failures, throttling, and server errors are transient; anything else is final.
pub fn is_retryable(err: &Error) -> bool {
	match err {
		Error::Reqwest(err) => err.is_timeout() || err.is_connect() || err.is_request(),
		Error::HttpStatus { status, body, .. } =>
			status.is_server_error()
				|| *status == StatusCode::TOO_MANY_REQUESTS
				|| body.as_deref().is_some_and(|body| body.contains("ThrottlingException")),
		_ => false,
	}
}
