//! Cache telemetry.
//!
//! Every [`CacheMetrics`] keeps in-process counters for status reporting and mirrors each event to
//! the global `metrics` recorder, labelled with the cache name.

// std
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
// crates.io
use metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use smallvec::SmallVec;
// self
use crate::_prelude::*;

type LabelSet = SmallVec<[Label; 2]>;

const METRIC_REQUESTS_TOTAL: &str = "presign_cache_requests_total";
const METRIC_HITS_TOTAL: &str = "presign_cache_hits_total";
const METRIC_MISSES_TOTAL: &str = "presign_cache_misses_total";
const METRIC_COALESCED_TOTAL: &str = "presign_cache_coalesced_total";
const METRIC_REFRESH_TOTAL: &str = "presign_cache_refresh_total";
const METRIC_REFRESH_DURATION: &str = "presign_cache_refresh_duration_seconds";
const METRIC_REFRESH_ERRORS: &str = "presign_cache_refresh_errors_total";

#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Telemetry for one cache.
#[derive(Debug)]
pub struct CacheMetrics {
	labels: LabelSet,
	requests: AtomicU64,
	hits: AtomicU64,
	coalesced: AtomicU64,
	refresh_successes: AtomicU64,
	refresh_errors: AtomicU64,
	last_refresh_micros: AtomicU64,
}
impl CacheMetrics {
	/// Metrics reported under `cache`.
	pub fn new(cache: &str) -> Arc<Self> {
		let mut labels = LabelSet::new();

		labels.push(Label::new("cache", cache.to_owned()));

		Arc::new(Self {
			labels,
			requests: AtomicU64::new(0),
			hits: AtomicU64::new(0),
			coalesced: AtomicU64::new(0),
			refresh_successes: AtomicU64::new(0),
			refresh_errors: AtomicU64::new(0),
			last_refresh_micros: AtomicU64::new(0),
		})
	}

	/// A lookup was served from a fresh value.
	pub fn hit(&self) {
		self.requests.fetch_add(1, Ordering::Relaxed);
		self.hits.fetch_add(1, Ordering::Relaxed);

		metrics::counter!(METRIC_REQUESTS_TOTAL, self.labels.iter()).increment(1);
		metrics::counter!(METRIC_HITS_TOTAL, self.labels.iter()).increment(1);
	}

	/// A lookup found the value absent or stale and queued for a refresh.
	pub fn miss(&self) {
		self.requests.fetch_add(1, Ordering::Relaxed);

		metrics::counter!(METRIC_REQUESTS_TOTAL, self.labels.iter()).increment(1);
		metrics::counter!(METRIC_MISSES_TOTAL, self.labels.iter()).increment(1);
	}

	/// A queued lookup adopted the outcome of an attempt made by another caller.
	pub fn coalesced(&self) {
		self.coalesced.fetch_add(1, Ordering::Relaxed);

		metrics::counter!(METRIC_COALESCED_TOTAL, self.labels.iter()).increment(1);
	}

	/// The producer succeeded after `elapsed`.
	pub fn refreshed(&self, elapsed: Duration) {
		self.refresh_successes.fetch_add(1, Ordering::Relaxed);
		self.last_refresh_micros
			.store(u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX), Ordering::Relaxed);

		metrics::counter!(METRIC_REFRESH_TOTAL, self.with_status("success").iter()).increment(1);
		metrics::histogram!(METRIC_REFRESH_DURATION, self.labels.iter())
			.record(elapsed.as_secs_f64());
	}

	/// The producer failed.
	pub fn refresh_failed(&self) {
		self.refresh_errors.fetch_add(1, Ordering::Relaxed);

		metrics::counter!(METRIC_REFRESH_TOTAL, self.with_status("error").iter()).increment(1);
		metrics::counter!(METRIC_REFRESH_ERRORS, self.labels.iter()).increment(1);
	}

	/// Point-in-time copy of the in-process counters.
	pub fn snapshot(&self) -> CacheMetricsSnapshot {
		CacheMetricsSnapshot {
			total_requests: self.requests.load(Ordering::Relaxed),
			cache_hits: self.hits.load(Ordering::Relaxed),
			coalesced: self.coalesced.load(Ordering::Relaxed),
			refresh_successes: self.refresh_successes.load(Ordering::Relaxed),
			refresh_errors: self.refresh_errors.load(Ordering::Relaxed),
			last_refresh: match self.last_refresh_micros.load(Ordering::Relaxed) {
				0 => None,
				micros => Some(Duration::from_micros(micros)),
			},
		}
	}

	fn with_status(&self, status: &'static str) -> LabelSet {
		let mut labels = self.labels.clone();

		labels.push(Label::new("status", status));

		labels
	}
}

/// Counters captured by [`CacheMetrics::snapshot`].
#[derive(Clone, Debug, PartialEq)]
pub struct CacheMetricsSnapshot {
	/// `get` calls observed.
	pub total_requests: u64,
	/// Calls served fresh without queueing.
	pub cache_hits: u64,
	/// Queued calls that adopted another caller's attempt.
	pub coalesced: u64,
	/// Successful producer invocations.
	pub refresh_successes: u64,
	/// Failed producer invocations.
	pub refresh_errors: u64,
	/// Latency of the most recent successful refresh.
	pub last_refresh: Option<Duration>,
}
impl CacheMetricsSnapshot {
	/// Share of requests served fresh.
	pub fn hit_rate(&self) -> f64 {
		if self.total_requests == 0 { 0.0 } else { self.cache_hits as f64 / self.total_requests as f64 }
	}

	/// Producer invocations, successful or not.
	pub fn refreshes(&self) -> u64 {
		self.refresh_successes + self.refresh_errors
	}
}

/// Install the Prometheus recorder; later calls are no-ops.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Handle of the installed Prometheus recorder, for rendering.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}
