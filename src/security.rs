//! Security utilities covering HTTPS enforcement, endpoint allowlists, and secret redaction.

// std
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
// crates.io
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::_prelude::*;

/// Secret string whose `Debug` and `Display` output is redacted.
///
/// Cloning is cheap; the value is shared behind an `Arc`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SecretString(Arc<str>);
impl SecretString {
	/// Wrap a secret value.
	pub fn new(value: impl Into<Arc<str>>) -> Self {
		Self(value.into())
	}

	/// Borrow the plaintext secret.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl Debug for SecretString {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str("SecretString(<redacted>)")
	}
}
impl Display for SecretString {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str("<redacted>")
	}
}
impl From<String> for SecretString {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}
impl From<&str> for SecretString {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}
impl From<SecretString> for String {
	fn from(value: SecretString) -> Self {
		value.0.to_string()
	}
}

/// Canonicalise a DNS name by trimming whitespace, removing any trailing dot, and lowercasing.
pub fn canonicalize_dns_name(value: &str) -> Option<String> {
	let trimmed = value.trim();
	let without_trailing_dot = trimmed.trim_end_matches('.');

	if without_trailing_dot.is_empty() {
		return None;
	}

	Some(without_trailing_dot.to_ascii_lowercase())
}

/// Ensure the provided URL uses HTTPS.
pub fn enforce_https(url: &Url) -> Result<()> {
	if url.scheme() == "https" {
		Ok(())
	} else {
		Err(Error::Security(format!("Endpoint {url} must use HTTPS.")))
	}
}

/// Evaluate whether the given hostname falls under one of the allowed domain suffixes.
///
/// When the list is empty, all hosts are considered valid.
pub fn host_is_allowed(host: &str, allowed_domains: &[String]) -> bool {
	if allowed_domains.is_empty() {
		return true;
	}

	let Some(host) = canonicalize_dns_name(host) else {
		return false;
	};

	allowed_domains.iter().filter_map(|domain| canonicalize_dns_name(domain)).any(|domain| {
		host == domain
			|| host.strip_suffix(&domain).and_then(|prefix| prefix.strip_suffix('.')).is_some()
	})
}

/// Validate an upstream endpoint against the HTTPS requirement and the domain allowlist.
pub fn check_endpoint(url: &Url, require_https: bool, allowed_domains: &[String]) -> Result<()> {
	if require_https {
		enforce_https(url)?;
	}

	let host = url.host_str().ok_or_else(|| {
		Error::Security(format!("Endpoint {url} must include a host component."))
	})?;

	if !host_is_allowed(host, allowed_domains) {
		return Err(Error::Security(format!(
			"Endpoint host '{host}' is not within the allowed domains."
		)));
	}

	Ok(())
}
