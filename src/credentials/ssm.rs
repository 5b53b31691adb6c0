//! SSM parameter store client and the producer that feeds the credential cache.

// std
use std::future::Future;
// crates.io
use reqwest::{
	Client,
	header::{CONTENT_TYPE, HeaderName, HeaderValue},
};
use serde::{Deserialize, Serialize};
use tokio::time;
use url::Url;
// self
use crate::{
	_prelude::*,
	cache::Producer,
	config::{Config, ENV_REGION, ENV_SECRET_PARAMETER, RetryPolicy},
	credentials::{Credentials, ENV_AWS_ACCESS_KEY_ID},
	http::{
		client::{build_client, send_json},
		retry::RetryState,
	},
	security::SecretString,
	sign::{WallClock, sigv4},
};

const SERVICE: &str = "ssm";
const TARGET_GET_PARAMETER: &str = "AmazonSSM.GetParameter";
const CONTENT_TYPE_JSON: &str = "application/x-amz-json-1.1";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetParameterInput<'a> {
	name: &'a str,
	with_decryption: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetParameterOutput {
	parameter: Option<Parameter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Parameter {
	value: Option<String>,
	#[serde(default)]
	version: Option<i64>,
}

/// Minimal SSM client fetching (optionally decrypted) parameters.
#[derive(Debug)]
pub struct ParameterStore {
	client: Client,
	endpoint: Option<Url>,
	region: Option<String>,
	credentials: Option<Credentials>,
	retry_policy: RetryPolicy,
	clock: Arc<dyn WallClock>,
}
impl ParameterStore {
	/// Build a parameter store client with the default reqwest client.
	pub fn new(
		config: &Config,
		credentials: Option<Credentials>,
		clock: Arc<dyn WallClock>,
	) -> Result<Self> {
		Ok(Self::with_client(config, credentials, clock, build_client()?))
	}

	/// Build a parameter store client using the supplied HTTP client.
	pub fn with_client(
		config: &Config,
		credentials: Option<Credentials>,
		clock: Arc<dyn WallClock>,
		client: Client,
	) -> Self {
		let endpoint = config.ssm_endpoint.clone().or_else(|| {
			let region = config.region.as_deref()?;

			Url::parse(&format!("https://ssm.{region}.amazonaws.com/")).ok()
		});

		Self {
			client,
			endpoint,
			region: config.region.clone(),
			credentials,
			retry_policy: config.retry_policy.clone(),
			clock,
		}
	}

	/// Fetch the value of parameter `name`, retrying transient failures.
	#[tracing::instrument(skip(self))]
	pub async fn get_parameter(&self, name: &str, with_decryption: bool) -> Result<SecretString> {
		let region = self.region.as_deref().ok_or(Error::Configuration { key: ENV_REGION })?;
		let endpoint = self.endpoint.as_ref().ok_or(Error::Configuration { key: ENV_REGION })?;
		let credentials =
			self.credentials.as_ref().ok_or(Error::Configuration { key: ENV_AWS_ACCESS_KEY_ID })?;
		let body = serde_json::to_vec(&GetParameterInput { name, with_decryption })?;
		let mut retry = RetryState::new(&self.retry_policy);
		let mut last_error = None;

		while let Some(timeout) = retry.attempt_timeout() {
			let builder = self.signed_request(endpoint, region, credentials, &body)?;

			match send_json::<GetParameterOutput>(builder, endpoint, timeout).await {
				Ok(output) => {
					let parameter = output.parameter.and_then(|p| p.value.map(|v| (v, p.version)));
					let Some((value, version)) = parameter else {
						return Err(Error::MissingParameter { name: name.to_owned() });
					};

					tracing::debug!(?version, retries = retry.retries(), "parameter fetched");

					return Ok(SecretString::from(value));
				},
				Err(err) => {
					let backoff = retry.backoff_after(&err);

					tracing::debug!(error = %err, ?backoff, "parameter fetch failed");

					last_error = Some(err);

					match backoff {
						Some(delay) => time::sleep(delay).await,
						None => break,
					}
				},
			}
		}

		Err(last_error.unwrap_or_else(|| Error::Timeout(self.retry_policy.deadline)))
	}

	fn signed_request(
		&self,
		endpoint: &Url,
		region: &str,
		credentials: &Credentials,
		body: &[u8],
	) -> Result<reqwest::RequestBuilder> {
		let scope = sigv4::Scope::new(self.clock.now(), region, SERVICE);
		let headers = [("content-type", CONTENT_TYPE_JSON), ("x-amz-target", TARGET_GET_PARAMETER)];
		let signed =
			sigv4::authorization_headers("POST", endpoint, &headers, body, credentials, &scope)?;
		let mut builder = self
			.client
			.post(endpoint.clone())
			.header(CONTENT_TYPE, CONTENT_TYPE_JSON)
			.header("x-amz-target", TARGET_GET_PARAMETER)
			.body(body.to_vec());

		for (name, value) in signed {
			let name = HeaderName::from_bytes(name.as_bytes())
				.map_err(|err| Error::Signing(err.to_string()))?;
			let value =
				HeaderValue::from_str(&value).map_err(|err| Error::Signing(err.to_string()))?;

			builder = builder.header(name, value);
		}

		Ok(builder)
	}
}

/// [`Producer`] resolving one decrypted parameter; this is what the credential cache memoises.
#[derive(Clone, Debug)]
pub struct SecretParameterProducer {
	store: Arc<ParameterStore>,
	name: Option<String>,
}
impl SecretParameterProducer {
	/// Produce the parameter called `name`; `None` fails every attempt with a configuration error.
	pub fn new(store: Arc<ParameterStore>, name: Option<String>) -> Self {
		Self { store, name }
	}
}
impl Producer for SecretParameterProducer {
	type Output = SecretString;

	fn produce(&self) -> impl Future<Output = Result<SecretString>> + Send {
		async move {
			let name =
				self.name.as_deref().ok_or(Error::Configuration { key: ENV_SECRET_PARAMETER })?;

			self.store.get_parameter(name, true).await
		}
	}
}
