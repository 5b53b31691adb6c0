//! Run request paths through the presign handler and print the JSON responses.

// std
use std::sync::Arc;
// crates.io
use clap::Parser;
use stable_presign::{Handler, Request, Result};
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

/// Sign S3 URLs with the base, fixed-time, or stable strategy.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
	/// Request paths, e.g. `/stable/0`; any other path renders the index page.
	#[arg(default_value = "/")]
	paths: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.with_writer(std::io::stderr)
		.init();

	#[cfg(feature = "prometheus")]
	stable_presign::install_default_exporter()?;

	let args = Args::parse();
	let handler = Arc::new(Handler::from_env()?);
	let mut tasks = JoinSet::new();

	for (index, path) in args.paths.into_iter().enumerate() {
		let handler = handler.clone();

		tasks.spawn(async move { (index, handler.handle(&Request::new(path)).await) });
	}

	let mut responses = tasks.join_all().await;

	responses.sort_by_key(|(index, _)| *index);

	for (_, response) in responses {
		println!("{}", serde_json::to_string(&response)?);
	}

	Ok(())
}
