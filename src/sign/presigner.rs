//! S3 pre-signed GET URLs.

// crates.io
use url::Url;
// self
use crate::{
	_prelude::*,
	config::{Config, ENV_REGION},
	credentials::{Credentials, ENV_AWS_ACCESS_KEY_ID},
	sign::{PresignRequest, Signer, WallClock, sigv4},
};

const SERVICE: &str = "s3";

/// [`Signer`] producing SigV4 query-authenticated S3 URLs.
///
/// Objects are addressed virtual-host style (`https://{bucket}.s3.{region}.amazonaws.com/{key}`)
/// unless a custom endpoint is configured, in which case path-style addressing is used.
#[derive(Debug)]
pub struct S3Presigner {
	ambient: Option<Credentials>,
	region: Option<String>,
	endpoint: Option<Url>,
	clock: Arc<dyn WallClock>,
}
impl S3Presigner {
	/// Presigner for the configured region and endpoint, falling back to `ambient` credentials when
	/// a request carries none.
	pub fn new(config: &Config, ambient: Option<Credentials>, clock: Arc<dyn WallClock>) -> Self {
		Self {
			ambient,
			region: config.region.clone(),
			endpoint: config.s3_endpoint.clone(),
			clock,
		}
	}

	fn object_url(&self, bucket: &str, key: &str, region: &str) -> Result<(Url, String)> {
		let key = key.trim_start_matches('/');

		match &self.endpoint {
			Some(endpoint) => {
				let prefix = endpoint.path().trim_end_matches('/');

				Ok((endpoint.clone(), format!("{prefix}/{bucket}/{key}")))
			},
			None => {
				let base = Url::parse(&format!("https://{bucket}.s3.{region}.amazonaws.com/"))?;

				Ok((base, format!("/{key}")))
			},
		}
	}
}
impl Signer for S3Presigner {
	fn presign(&self, request: &PresignRequest) -> Result<String> {
		let region = self.region.as_deref().ok_or(Error::Configuration { key: ENV_REGION })?;
		let credentials = request
			.credentials
			.as_ref()
			.or(self.ambient.as_ref())
			.ok_or(Error::Configuration { key: ENV_AWS_ACCESS_KEY_ID })?;
		let signing_time = request.signing_time.unwrap_or_else(|| self.clock.now());
		let scope = sigv4::Scope::new(signing_time, region, SERVICE);
		let (base, path) = self.object_url(&request.bucket, &request.key, region)?;
		let url = sigv4::presign_url(&base, &path, credentials, &scope, request.expires_in)?;

		tracing::trace!(bucket = %request.bucket, key = %request.key, %signing_time, "presigned");

		Ok(url.into())
	}
}
