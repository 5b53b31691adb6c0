//! AWS credentials and the parameter store used as the cached secret source.

pub mod ssm;

pub use ssm::{ParameterStore, SecretParameterProducer};

// self
use crate::{_prelude::*, security::SecretString};

/// Access key id of the execution role.
pub const ENV_AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
/// Secret access key of the execution role.
pub const ENV_AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
/// Session token of the execution role.
pub const ENV_AWS_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";

/// AWS signing credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
	access_key_id: String,
	secret_access_key: SecretString,
	session_token: Option<SecretString>,
}
impl Credentials {
	/// Long-term credentials without a session token.
	pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<SecretString>) -> Self {
		Self {
			access_key_id: access_key_id.into(),
			secret_access_key: secret_access_key.into(),
			session_token: None,
		}
	}

	/// Attach a session token, as issued with temporary role credentials.
	pub fn with_session_token(mut self, token: impl Into<SecretString>) -> Self {
		self.session_token = Some(token.into());

		self
	}

	/// Ambient credentials from the process environment.
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Ambient credentials through an arbitrary variable lookup.
	pub fn from_lookup<F>(lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |key: &'static str| {
			lookup(key).filter(|v| !v.is_empty()).ok_or(Error::Configuration { key })
		};
		let credentials = Self::new(var(ENV_AWS_ACCESS_KEY_ID)?, var(ENV_AWS_SECRET_ACCESS_KEY)?);

		Ok(match var(ENV_AWS_SESSION_TOKEN) {
			Ok(token) => credentials.with_session_token(token),
			Err(_) => credentials,
		})
	}

	/// Access key id.
	pub fn access_key_id(&self) -> &str {
		&self.access_key_id
	}

	/// Secret access key.
	pub fn secret_access_key(&self) -> &SecretString {
		&self.secret_access_key
	}

	/// Session token, if any.
	pub fn session_token(&self) -> Option<&SecretString> {
		self.session_token.as_ref()
	}
}
