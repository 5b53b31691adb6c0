//! Environment-driven configuration and validation.
//!
//! Values the signing strategies need are kept optional so that a missing variable fails only the
//! strategy that depends on it, with [`Error::Configuration`], instead of the whole process.

// std
use std::cell::RefCell;
// crates.io
use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::{_prelude::*, security};

thread_local! {
	static SMALL_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_rng(&mut rand::rng()));
}

/// Bucket holding the objects to sign.
pub const ENV_BUCKET: &str = "IMAGES_BUCKET";
/// Name of the SSM parameter holding the pinned secret access key.
pub const ENV_SECRET_PARAMETER: &str = "SECRET_ACCESS_KEY_PARAMETER";
/// Access key id paired with the pinned secret.
pub const ENV_ACCESS_KEY_ID: &str = "ACCESS_KEY_ID";
/// Region used for S3 and SSM.
pub const ENV_REGION: &str = "AWS_REGION";
/// Fallback region variable.
pub const ENV_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
/// Object key override.
pub const ENV_OBJECT_KEY: &str = "OBJECT_KEY";
/// Pre-signed URL lifetime in seconds.
pub const ENV_EXPIRES_IN: &str = "PRESIGN_EXPIRES_IN";
/// Signing time bucket width in seconds.
pub const ENV_BUCKET_WIDTH: &str = "PRESIGN_BUCKET_WIDTH";
/// Credential cache TTL in milliseconds.
pub const ENV_CREDENTIAL_TTL: &str = "CREDENTIAL_CACHE_TTL_MS";
/// Custom S3 endpoint (path-style addressing).
pub const ENV_S3_ENDPOINT: &str = "S3_ENDPOINT";
/// Custom SSM endpoint.
pub const ENV_SSM_ENDPOINT: &str = "SSM_ENDPOINT";

/// Object signed by every strategy unless overridden.
pub const DEFAULT_OBJECT_KEY: &str = "test.jpg";
/// Default URL lifetime, matching the AWS SDK presigner.
pub const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(900);
/// Default signing bucket width.
pub const DEFAULT_BUCKET_WIDTH: Duration = Duration::from_secs(5 * 60);
/// Default TTL for the cached secret.
pub const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_millis(15_000);
/// Longest lifetime SigV4 accepts for a pre-signed URL.
pub const MAX_EXPIRES_IN: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Supported jitter strategies for retry policies.
#[derive(Clone, Debug, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
	/// No jitter; deterministic backoff schedule.
	None,
	/// Full jitter; randomize delay between 80% and 100% of the current backoff.
	#[default]
	Full,
	/// Decorrelated jitter per AWS architecture guidance.
	Decorrelated,
}

/// Retry configuration for parameter store calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryPolicy {
	/// Maximum number of retry attempts to perform after the initial request.
	pub max_retries: u32,
	/// Timeout applied to each individual HTTP attempt.
	pub attempt_timeout: Duration,
	/// Initial delay before retrying after a failure.
	pub initial_backoff: Duration,
	/// Upper bound applied to exponential backoff growth.
	pub max_backoff: Duration,
	/// Overall deadline that bounds the entire retry sequence.
	pub deadline: Duration,
	/// Strategy used to randomize the computed backoff.
	#[serde(default)]
	pub jitter: JitterStrategy,
}
impl RetryPolicy {
	/// Validate invariants for retry configuration.
	pub fn validate(&self) -> Result<()> {
		if self.attempt_timeout < Duration::from_millis(100) {
			return Err(Error::Validation {
				field: "retry_policy.attempt_timeout",
				reason: "Must be at least 100 ms.".into(),
			});
		}
		if self.initial_backoff.is_zero() {
			return Err(Error::Validation {
				field: "retry_policy.initial_backoff",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.max_backoff < self.initial_backoff {
			return Err(Error::Validation {
				field: "retry_policy.max_backoff",
				reason: "Must be greater than or equal to initial_backoff.".into(),
			});
		}
		if self.deadline < self.attempt_timeout {
			return Err(Error::Validation {
				field: "retry_policy.deadline",
				reason: "Must be greater than or equal to attempt_timeout.".into(),
			});
		}

		Ok(())
	}

	/// Exponential backoff for a retry attempt with the configured jitter applied.
	pub fn compute_backoff(&self, attempt: u32) -> Duration {
		let exponent = attempt.min(32);
		let base = self.initial_backoff.mul_f64(2f64.powi(exponent as i32));
		let bounded = base.min(self.max_backoff).max(self.initial_backoff);

		match self.jitter {
			JitterStrategy::None => bounded,
			JitterStrategy::Full => {
				let lower = bounded.mul_f64(0.8).max(self.initial_backoff);

				random_within(lower, bounded)
			},
			JitterStrategy::Decorrelated => {
				let prev = if attempt == 0 { self.initial_backoff } else { bounded };
				let ceiling = self.max_backoff.min(prev.mul_f64(3.0));

				random_within(self.initial_backoff, ceiling.max(self.initial_backoff))
			},
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 2,
			attempt_timeout: Duration::from_secs(3),
			initial_backoff: Duration::from_millis(100),
			max_backoff: Duration::from_secs(1),
			deadline: Duration::from_secs(8),
			jitter: JitterStrategy::Full,
		}
	}
}

/// Runtime configuration for the signing strategies.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
	/// Bucket holding the signed object.
	#[serde(default)]
	pub bucket: Option<String>,
	/// Key of the signed object.
	#[serde(default = "default_object_key")]
	pub object_key: String,
	/// SSM parameter holding the pinned secret access key.
	#[serde(default)]
	pub secret_parameter: Option<String>,
	/// Access key id paired with the pinned secret.
	#[serde(default)]
	pub access_key_id: Option<String>,
	/// Region for S3 and SSM.
	#[serde(default)]
	pub region: Option<String>,
	/// Lifetime of generated URLs.
	#[serde(default = "default_expires_in")]
	pub expires_in: Duration,
	/// Width of the signing time buckets.
	#[serde(default = "default_bucket_width")]
	pub bucket_width: Duration,
	/// How long a fetched secret stays fresh.
	#[serde(default = "default_credential_ttl")]
	pub credential_ttl: Duration,
	/// Custom S3 endpoint; objects are addressed path-style when set.
	#[serde(default)]
	pub s3_endpoint: Option<Url>,
	/// Custom SSM endpoint.
	#[serde(default)]
	pub ssm_endpoint: Option<Url>,
	/// Whether custom endpoints must use HTTPS.
	#[serde(default = "default_true")]
	pub require_https: bool,
	/// Optional allowlist of domains custom endpoints must belong to.
	#[serde(default)]
	pub allowed_domains: Vec<String>,
	/// Retry policy for parameter store lookups.
	#[serde(default)]
	pub retry_policy: RetryPolicy,
}
impl Config {
	/// Load configuration from the process environment.
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Load configuration through an arbitrary variable lookup.
	pub fn from_lookup<F>(lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
		let mut config = Self {
			bucket: var(ENV_BUCKET),
			secret_parameter: var(ENV_SECRET_PARAMETER),
			access_key_id: var(ENV_ACCESS_KEY_ID),
			region: var(ENV_REGION).or_else(|| var(ENV_DEFAULT_REGION)),
			..Self::default()
		};

		if let Some(key) = var(ENV_OBJECT_KEY) {
			config.object_key = key;
		}
		if let Some(raw) = var(ENV_EXPIRES_IN) {
			config.expires_in = Duration::from_secs(parse_number(ENV_EXPIRES_IN, &raw)?);
		}
		if let Some(raw) = var(ENV_BUCKET_WIDTH) {
			config.bucket_width = Duration::from_secs(parse_number(ENV_BUCKET_WIDTH, &raw)?);
		}
		if let Some(raw) = var(ENV_CREDENTIAL_TTL) {
			config.credential_ttl = Duration::from_millis(parse_number(ENV_CREDENTIAL_TTL, &raw)?);
		}
		if let Some(raw) = var(ENV_S3_ENDPOINT) {
			config.s3_endpoint = Some(Url::parse(&raw)?);
		}
		if let Some(raw) = var(ENV_SSM_ENDPOINT) {
			config.ssm_endpoint = Some(Url::parse(&raw)?);
		}

		config.validate()?;

		Ok(config)
	}

	/// Set HTTPS requirement to the desired value.
	pub fn with_require_https(mut self, require_https: bool) -> Self {
		self.require_https = require_https;

		self
	}

	/// Validate the configuration against the documented constraints.
	///
	/// Missing strategy inputs are not validation failures; they surface when used.
	pub fn validate(&self) -> Result<()> {
		if self.object_key.is_empty() {
			return Err(Error::Validation {
				field: "object_key",
				reason: "Must not be empty.".into(),
			});
		}
		if self.expires_in < Duration::from_secs(1) || self.expires_in > MAX_EXPIRES_IN {
			return Err(Error::Validation {
				field: "expires_in",
				reason: format!("Must be between 1 second and {MAX_EXPIRES_IN:?}."),
			});
		}
		if self.bucket_width < Duration::from_secs(1) {
			return Err(Error::Validation {
				field: "bucket_width",
				reason: "Must be at least 1 second.".into(),
			});
		}
		if self.bucket_width >= self.expires_in {
			return Err(Error::Validation {
				field: "bucket_width",
				reason: "Must be shorter than expires_in, or URLs expire within their own bucket."
					.into(),
			});
		}
		if self.credential_ttl.is_zero() {
			return Err(Error::Validation {
				field: "credential_ttl",
				reason: "Must be greater than zero.".into(),
			});
		}
		if let Some(bucket) = &self.bucket {
			validate_bucket_name(bucket)?;
		}
		if let Some(region) = &self.region {
			validate_region(region)?;
		}
		for endpoint in [&self.s3_endpoint, &self.ssm_endpoint].into_iter().flatten() {
			security::check_endpoint(endpoint, self.require_https, &self.allowed_domains)?;
		}

		self.retry_policy.validate()
	}

	/// Bucket name, or a configuration error when unset.
	pub fn bucket(&self) -> Result<&str> {
		required(&self.bucket, ENV_BUCKET)
	}

	/// Secret parameter name, or a configuration error when unset.
	pub fn secret_parameter(&self) -> Result<&str> {
		required(&self.secret_parameter, ENV_SECRET_PARAMETER)
	}

	/// Pinned access key id, or a configuration error when unset.
	pub fn access_key_id(&self) -> Result<&str> {
		required(&self.access_key_id, ENV_ACCESS_KEY_ID)
	}

	/// Region, or a configuration error when unset.
	pub fn region(&self) -> Result<&str> {
		required(&self.region, ENV_REGION)
	}
}
impl Default for Config {
	fn default() -> Self {
		Self {
			bucket: None,
			object_key: DEFAULT_OBJECT_KEY.into(),
			secret_parameter: None,
			access_key_id: None,
			region: None,
			expires_in: DEFAULT_EXPIRES_IN,
			bucket_width: DEFAULT_BUCKET_WIDTH,
			credential_ttl: DEFAULT_CREDENTIAL_TTL,
			s3_endpoint: None,
			ssm_endpoint: None,
			require_https: true,
			allowed_domains: Vec::new(),
			retry_policy: RetryPolicy::default(),
		}
	}
}

pub(crate) fn random_within(min: Duration, max: Duration) -> Duration {
	if max <= min {
		return max;
	}

	SMALL_RNG.with(|cell| {
		let mut rng = cell.borrow_mut();
		let nanos = max.as_nanos() - min.as_nanos();
		let jitter = rng.random_range(0..=nanos.min(u64::MAX as u128));

		min + Duration::from_nanos(jitter as u64)
	})
}

fn required<'a>(value: &'a Option<String>, key: &'static str) -> Result<&'a str> {
	value.as_deref().ok_or(Error::Configuration { key })
}

fn parse_number(field: &'static str, raw: &str) -> Result<u64> {
	raw.parse().map_err(|err| Error::Validation {
		field,
		reason: format!("Expected an unsigned integer, got '{raw}': {err}."),
	})
}

fn default_true() -> bool {
	true
}

fn default_object_key() -> String {
	DEFAULT_OBJECT_KEY.into()
}

fn default_expires_in() -> Duration {
	DEFAULT_EXPIRES_IN
}

fn default_bucket_width() -> Duration {
	DEFAULT_BUCKET_WIDTH
}

fn default_credential_ttl() -> Duration {
	DEFAULT_CREDENTIAL_TTL
}

fn validate_bucket_name(value: &str) -> Result<()> {
	if !(3..=63).contains(&value.len()) {
		return Err(Error::Validation {
			field: "bucket",
			reason: "Must be between 3 and 63 characters.".into(),
		});
	}
	if !value.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'-' | b'.'))
	{
		return Err(Error::Validation {
			field: "bucket",
			reason: "May only contain lowercase ASCII letters, numbers, '-', or '.'.".into(),
		});
	}

	Ok(())
}

fn validate_region(value: &str) -> Result<()> {
	if value.is_empty()
		|| !value.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
	{
		return Err(Error::Validation {
			field: "region",
			reason: "May only contain lowercase ASCII letters, numbers, and '-'.".into(),
		});
	}

	Ok(())
}
