//! Request routing and the demo index page.

// std
use std::{collections::BTreeMap, fmt::Write};
// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::{
	_prelude::*,
	cache::Producer,
	config::Config,
	credentials::{Credentials, SecretParameterProducer},
	security::SecretString,
	strategy::{Strategies, Strategy},
};

const IFRAMES_PER_STRATEGY: usize = 5;

/// Inbound invocation; only the raw path is inspected.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
	/// Request path, e.g. `/stable/3`.
	pub raw_path: String,
}
impl Request {
	/// Request for `raw_path`.
	pub fn new(raw_path: impl Into<String>) -> Self {
		Self { raw_path: raw_path.into() }
	}
}

/// Invocation result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
	/// HTTP status.
	pub status_code: u16,
	/// Response headers.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub headers: BTreeMap<String, String>,
	/// Response body.
	pub body: String,
}
impl Response {
	fn text(body: String) -> Self {
		Self { status_code: 200, headers: BTreeMap::new(), body }
	}

	fn html(body: String) -> Self {
		let headers = BTreeMap::from([("content-type".to_owned(), "text/html".to_owned())]);

		Self { status_code: 200, headers, body }
	}

	fn internal_error() -> Self {
		Self { status_code: 500, headers: BTreeMap::new(), body: "Internal Server Error".into() }
	}
}

/// Routes requests to a [`Strategy`] and renders the result.
#[derive(Debug)]
pub struct Handler<P = SecretParameterProducer>
where
	P: Producer<Output = SecretString>,
{
	strategies: Strategies<P>,
}
impl Handler<SecretParameterProducer> {
	/// Handler configured from the process environment.
	///
	/// Missing ambient credentials are tolerated here; the strategies that need them fail when
	/// invoked.
	pub fn from_env() -> Result<Self> {
		Self::from_config(Config::from_env()?, Credentials::from_env().ok())
	}

	/// Handler for `config`, with `ambient` as the execution role's credentials.
	pub fn from_config(config: Config, ambient: Option<Credentials>) -> Result<Self> {
		Ok(Self::new(Strategies::from_config(config, ambient)?))
	}
}
impl<P> Handler<P>
where
	P: Producer<Output = SecretString>,
{
	/// Handler over explicit strategies.
	pub fn new(strategies: Strategies<P>) -> Self {
		Self { strategies }
	}

	/// Strategies behind this handler.
	pub fn strategies(&self) -> &Strategies<P> {
		&self.strategies
	}

	/// Serve one request. Failures become a `500` response and are logged.
	#[tracing::instrument(skip(self, request), fields(path = %request.raw_path))]
	pub async fn handle(&self, request: &Request) -> Response {
		let Some(strategy) = Strategy::from_path(&request.raw_path) else {
			return Response::html(index_page());
		};

		match self.strategies.sign(strategy).await {
			Ok(url) => Response::text(url),
			Err(err) => {
				tracing::error!(
					strategy = strategy.as_str(),
					error = %err,
					cause = %err.root(),
					"signing failed"
				);

				Response::internal_error()
			},
		}
	}
}

fn index_page() -> String {
	let mut page = String::from(
		"<!DOCTYPE html>\n<html lang=\"en\">\n  <head>\n    <meta charset=\"UTF-8\">\n  </head>\n  <body>\n",
	);

	for (title, strategy) in [
		("Normal signing", Strategy::Base),
		("Fixed time signing", Strategy::FixedTime),
		("Stable signing", Strategy::Stable),
	] {
		let _ = writeln!(page, "\t<h2>{title}:</h2>");

		for i in 0..IFRAMES_PER_STRATEGY {
			let _ = write!(
				page,
				"<iframe style=\"display: block; width: 100%;\" src=\"/{}/{i}\"></iframe>",
				strategy.as_str()
			);
		}

		page.push('\n');
	}

	page.push_str("  </body>\n</html>\n");

	page
}
