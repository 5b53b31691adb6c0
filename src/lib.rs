//! Stable S3 pre-signed URLs backed by a single-flight, TTL-bounded credential cache.
//!
//! Three signing strategies are exposed through [`Handler`]: ordinary signing, signing pinned to
//! a rounded time bucket, and signing with a secret fetched from the SSM parameter store. The
//! parameter store lookup is memoised by [`cache::SingleFlight`], which coalesces concurrent
//! refreshes into a single upstream call and never caches failures.

#![deny(clippy::all, missing_docs)]

pub mod cache;
pub mod config;
pub mod credentials;
pub mod handler;
pub mod http;
pub mod metrics;
pub mod security;
pub mod sign;
pub mod strategy;

mod error;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, TimeDelta, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}

#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	cache::{CacheSnapshot, CacheStatus, Producer, SingleFlight},
	config::{Config, JitterStrategy, RetryPolicy},
	credentials::{Credentials, ParameterStore, SecretParameterProducer},
	error::{Error, Result},
	handler::{Handler, Request, Response},
	sign::{PresignRequest, S3Presigner, Signer, SystemClock, TimeBucket, WallClock},
	strategy::{Strategies, Strategy},
};
