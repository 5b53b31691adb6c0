//! Single-flight manager coordinating lookups and refreshes of a cached value.

// std
use std::{
	fmt::{Debug, Formatter, Result as FmtResult},
	future::Future,
};
// crates.io
use serde::Serialize;
use tokio::{
	sync::{Mutex, RwLock},
	time,
};
// self
use crate::{
	_prelude::*,
	cache::{entry::CacheEntry, state::CacheStatus},
	metrics::CacheMetrics,
};

/// Zero-argument asynchronous operation whose result is cached.
pub trait Producer: Send + Sync {
	/// Value produced on success.
	type Output: Clone + Send + Sync;

	/// Run the operation once.
	fn produce(&self) -> impl Future<Output = Result<Self::Output>> + Send;
}
impl<F, Fut, T> Producer for F
where
	F: Fn() -> Fut + Send + Sync,
	Fut: Future<Output = Result<T>> + Send,
	T: Clone + Send + Sync,
{
	type Output = T;

	fn produce(&self) -> impl Future<Output = Result<T>> + Send {
		(self)()
	}
}

/// Caches the result of a [`Producer`] for a fixed TTL and coalesces concurrent refreshes.
///
/// Fresh lookups only take a read lock. Lookups that find the value absent or stale queue on a
/// fair mutex; whoever reaches the head first invokes the producer, and everyone that queued while
/// that attempt was running adopts its outcome, success or failure. Failures are never cached.
pub struct SingleFlight<P>
where
	P: Producer,
{
	producer: P,
	entry: RwLock<CacheEntry<P::Output>>,
	single_flight: Mutex<()>,
	refresh_timeout: Option<Duration>,
	metrics: Arc<CacheMetrics>,
}
impl<P> SingleFlight<P>
where
	P: Producer,
{
	/// Wrap `producer`, keeping each produced value fresh for `ttl`.
	pub fn new(name: impl Into<Arc<str>>, ttl: Duration, producer: P) -> Self {
		let name = name.into();

		Self {
			producer,
			metrics: CacheMetrics::new(&name),
			entry: RwLock::new(CacheEntry::new(name, ttl)),
			single_flight: Mutex::new(()),
			refresh_timeout: None,
		}
	}

	/// Fail a refresh attempt whose producer runs longer than `timeout`.
	pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
		self.refresh_timeout = Some(timeout);

		self
	}

	/// Access the per-cache metrics accumulator.
	pub fn metrics(&self) -> Arc<CacheMetrics> {
		self.metrics.clone()
	}

	/// Capture the current cache state for status reporting.
	pub async fn snapshot(&self) -> CacheSnapshot {
		let entry = self.entry.read().await;

		CacheSnapshot {
			name: entry.name().to_owned(),
			ttl: entry.ttl(),
			status: entry.status(Instant::now()),
			refreshed_at: entry.cached().map(|cached| cached.refreshed_at),
			attempts: entry.attempts(),
			consecutive_failures: entry.consecutive_failures(),
		}
	}

	/// Return the cached value, refreshing it first when absent or stale.
	pub async fn get(&self) -> Result<P::Output> {
		let observed = {
			let entry = self.entry.read().await;

			if let Some(value) = entry.fresh(Instant::now()) {
				let value = value.clone();

				tracing::trace!(cache = entry.name(), "serving fresh value");
				self.metrics.hit();

				return Ok(value);
			}

			self.metrics.miss();

			entry.attempts()
		};

		self.refresh(observed).await
	}

	#[tracing::instrument(skip(self))]
	async fn refresh(&self, observed: u64) -> Result<P::Output> {
		let _guard = self.single_flight.lock().await;

		{
			let entry = self.entry.read().await;

			if let Some(outcome) = entry.outcome_since(observed) {
				tracing::debug!(attempt = entry.attempts(), "adopting outcome of queued attempt");
				self.metrics.coalesced();

				return outcome;
			}
			if let Some(value) = entry.fresh(Instant::now()) {
				return Ok(value.clone());
			}
		}

		let started = Instant::now();
		let started_wallclock = Utc::now();
		let produced = match self.refresh_timeout {
			Some(limit) => time::timeout(limit, self.producer.produce())
				.await
				.unwrap_or_else(|_| Err(Error::Timeout(limit))),
			None => self.producer.produce().await,
		};
		let mut entry = self.entry.write().await;

		match produced {
			Ok(value) => {
				let attempt = entry.record_success(value.clone(), started, started_wallclock);

				tracing::debug!(cache = entry.name(), attempt, "refresh succeeded");
				self.metrics.refreshed(started.elapsed());

				Ok(value)
			},
			Err(err) => {
				tracing::warn!(cache = entry.name(), error = %err, "refresh failed");

				let shared = entry.record_failure(err);

				self.metrics.refresh_failed();

				Err(shared)
			},
		}
	}
}
impl<P> Debug for SingleFlight<P>
where
	P: Producer,
{
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("SingleFlight")
			.field("refresh_timeout", &self.refresh_timeout)
			.field("metrics", &self.metrics.snapshot())
			.finish_non_exhaustive()
	}
}

/// Snapshot of cache state captured for status reporting.
#[derive(Clone, Debug, Serialize)]
pub struct CacheSnapshot {
	/// Cache name.
	pub name: String,
	/// Configured time-to-live.
	pub ttl: Duration,
	/// Freshness at capture time.
	pub status: CacheStatus,
	/// Wall-clock time of the last successful refresh.
	pub refreshed_at: Option<DateTime<Utc>>,
	/// Completed refresh attempts.
	pub attempts: u64,
	/// Failed attempts since the last success.
	pub consecutive_failures: u32,
}
impl CacheSnapshot {
	/// Age of the cached value relative to `now`, if any.
	pub fn age(&self, now: DateTime<Utc>) -> Option<TimeDelta> {
		self.refreshed_at.map(|refreshed_at| now - refreshed_at)
	}
}
