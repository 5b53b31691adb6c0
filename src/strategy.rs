//! The three signing strategies.
//!
//! - [`Strategy::Base`]: ambient credentials, current time.
//! - [`Strategy::FixedTime`]: ambient credentials, time truncated to the signing bucket.
//! - [`Strategy::Stable`]: pinned access key with its secret resolved through the credential cache,
//!   time truncated to the signing bucket. Repeated requests inside one bucket yield identical URLs.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// self
use crate::{
	_prelude::*,
	cache::{Producer, SingleFlight},
	config::Config,
	credentials::{Credentials, ParameterStore, SecretParameterProducer},
	security::SecretString,
	sign::{PresignRequest, S3Presigner, Signer, SystemClock, TimeBucket, WallClock},
};

/// Name under which the credential cache reports logs and metrics.
pub const CREDENTIAL_CACHE: &str = "secret_access_key";

/// Signing strategy selected by the request path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
	/// Sign with ambient credentials at the current time.
	Base,
	/// Sign with ambient credentials at the start of the current time bucket.
	FixedTime,
	/// Sign with the cached pinned secret at the start of the current time bucket.
	Stable,
}
impl Strategy {
	/// Match `/base/..`, `/fixed_time/..` and `/stable/..`; the leading slash is optional.
	pub fn from_path(path: &str) -> Option<Self> {
		let path = path.strip_prefix('/').unwrap_or(path);

		if path.starts_with("base/") {
			Some(Self::Base)
		} else if path.starts_with("fixed_time/") {
			Some(Self::FixedTime)
		} else if path.starts_with("stable/") {
			Some(Self::Stable)
		} else {
			None
		}
	}

	/// Route segment of the strategy.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Base => "base",
			Self::FixedTime => "fixed_time",
			Self::Stable => "stable",
		}
	}
}

/// Everything the strategies need: configuration, a [`Signer`], the credential cache, and a clock.
///
/// One instance is built per process and shared; the credential cache it holds lives as long as
/// the instance does.
pub struct Strategies<P = SecretParameterProducer>
where
	P: Producer<Output = SecretString>,
{
	config: Config,
	signer: Arc<dyn Signer>,
	credential_cache: Arc<SingleFlight<P>>,
	clock: Arc<dyn WallClock>,
	bucket: TimeBucket,
}
impl Strategies<SecretParameterProducer> {
	/// Wire the production collaborators: the S3 presigner and an SSM-backed credential cache.
	///
	/// `ambient` are the execution role's credentials, used by the ambient strategies and to
	/// authenticate against the parameter store.
	pub fn from_config(config: Config, ambient: Option<Credentials>) -> Result<Self> {
		let clock: Arc<dyn WallClock> = Arc::new(SystemClock);
		let store = Arc::new(ParameterStore::new(&config, ambient.clone(), clock.clone())?);
		let producer = SecretParameterProducer::new(store, config.secret_parameter.clone());
		let credential_cache = Arc::new(
			SingleFlight::new(CREDENTIAL_CACHE, config.credential_ttl, producer)
				.with_refresh_timeout(config.retry_policy.deadline),
		);
		let signer = Arc::new(S3Presigner::new(&config, ambient, clock.clone()));

		Self::new(config, signer, credential_cache, clock)
	}
}
impl<P> Strategies<P>
where
	P: Producer<Output = SecretString>,
{
	/// Assemble strategies from explicit collaborators.
	pub fn new(
		config: Config,
		signer: Arc<dyn Signer>,
		credential_cache: Arc<SingleFlight<P>>,
		clock: Arc<dyn WallClock>,
	) -> Result<Self> {
		let bucket = TimeBucket::new(config.bucket_width)?;

		Ok(Self { config, signer, credential_cache, clock, bucket })
	}

	/// Configuration the strategies were built with.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Shared credential cache used by [`Strategy::Stable`].
	pub fn credential_cache(&self) -> &Arc<SingleFlight<P>> {
		&self.credential_cache
	}

	/// Produce a pre-signed URL with `strategy`.
	///
	/// Configuration is resolved before the credential cache is consulted, so a missing value fails
	/// without touching the parameter store.
	#[tracing::instrument(skip(self))]
	pub async fn sign(&self, strategy: Strategy) -> Result<String> {
		let request = match strategy {
			Strategy::Base => self.request(None)?,
			Strategy::FixedTime => self.request(Some(self.signing_time()?))?,
			Strategy::Stable => {
				let mut request = self.request(Some(self.signing_time()?))?;
				let access_key_id = self.config.access_key_id()?.to_owned();
				let secret = self.credential_cache.get().await?;

				request.credentials = Some(Credentials::new(access_key_id, secret));

				request
			},
		};
		let url = self.signer.presign(&request)?;

		tracing::debug!(signing_time = ?request.signing_time, "url signed");

		Ok(url)
	}

	fn signing_time(&self) -> Result<DateTime<Utc>> {
		self.bucket.floor(self.clock.now())
	}

	/// Request skeleton signed with ambient credentials unless the caller fills them in.
	fn request(&self, signing_time: Option<DateTime<Utc>>) -> Result<PresignRequest> {
		Ok(PresignRequest {
			bucket: self.config.bucket()?.to_owned(),
			key: self.config.object_key.clone(),
			credentials: None,
			signing_time,
			expires_in: self.config.expires_in,
		})
	}
}
impl<P> Debug for Strategies<P>
where
	P: Producer<Output = SecretString>,
{
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("Strategies")
			.field("config", &self.config)
			.field("signer", &self.signer)
			.field("credential_cache", &self.credential_cache)
			.field("bucket", &self.bucket)
			.finish_non_exhaustive()
	}
}
