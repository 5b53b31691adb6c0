//! Cache entry bookkeeping: the cached value plus the history of refresh attempts.

// self
use crate::{
	_prelude::*,
	cache::state::{AttemptFailure, CacheStatus, CachedValue},
};

/// Process-local cache slot for a single producer.
///
/// The entry never holds a value without its capture time; a failed attempt is recorded next to
/// the value but never replaces it.
#[derive(Clone, Debug)]
pub struct CacheEntry<T> {
	name: Arc<str>,
	ttl: Duration,
	cached: Option<CachedValue<T>>,
	attempts: u64,
	last_failure: Option<AttemptFailure>,
	consecutive_failures: u32,
}
impl<T> CacheEntry<T> {
	/// Create an empty entry.
	pub fn new(name: impl Into<Arc<str>>, ttl: Duration) -> Self {
		Self {
			name: name.into(),
			ttl,
			cached: None,
			attempts: 0,
			last_failure: None,
			consecutive_failures: 0,
		}
	}

	/// Name used for logs and metrics.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Configured time-to-live.
	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Last successfully produced value, fresh or not.
	pub fn cached(&self) -> Option<&CachedValue<T>> {
		self.cached.as_ref()
	}

	/// The cached value when it is still fresh at `now`.
	pub fn fresh(&self, now: Instant) -> Option<&T> {
		self.cached.as_ref().filter(|cached| cached.is_fresh(self.ttl, now)).map(|c| &c.value)
	}

	/// Freshness classification at `now`.
	pub fn status(&self, now: Instant) -> CacheStatus {
		match &self.cached {
			None => CacheStatus::Empty,
			Some(cached) if cached.is_fresh(self.ttl, now) => CacheStatus::Fresh,
			Some(_) => CacheStatus::Stale,
		}
	}

	/// Number of refresh attempts that have completed, successfully or not.
	pub fn attempts(&self) -> u64 {
		self.attempts
	}

	/// Count of failed attempts since the last success.
	pub fn consecutive_failures(&self) -> u32 {
		self.consecutive_failures
	}

	/// Record a successful attempt and return its sequence number.
	///
	/// `produced_at` never moves backwards; an older capture is counted but not stored.
	pub fn record_success(&mut self, value: T, produced_at: Instant, refreshed_at: DateTime<Utc>) -> u64 {
		self.attempts = self.attempts.saturating_add(1);
		self.last_failure = None;
		self.consecutive_failures = 0;

		let newer = self.cached.as_ref().is_none_or(|cached| produced_at >= cached.produced_at);

		if newer {
			self.cached = Some(CachedValue::new(value, produced_at, refreshed_at));
		}

		self.attempts
	}

	/// Record a failed attempt; the cached value is left untouched.
	pub fn record_failure(&mut self, error: Error) -> Error {
		self.attempts = self.attempts.saturating_add(1);
		self.consecutive_failures = self.consecutive_failures.saturating_add(1);

		let failure = AttemptFailure { attempt: self.attempts, error: Arc::new(error) };
		let shared = failure.to_error();

		self.last_failure = Some(failure);

		shared
	}
}
impl<T> CacheEntry<T>
where
	T: Clone,
{
	/// Outcome of the most recent attempt if one completed after `observed` attempts.
	///
	/// Callers that queued behind a running attempt use this to adopt that attempt's result
	/// instead of starting another one.
	pub fn outcome_since(&self, observed: u64) -> Option<Result<T>> {
		if self.attempts <= observed {
			return None;
		}

		match &self.last_failure {
			Some(failure) if failure.attempt == self.attempts => Some(Err(failure.to_error())),
			_ => self.cached.as_ref().map(|cached| Ok(cached.value.clone())),
		}
	}
}
