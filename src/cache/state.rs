//! Cached payload and the observable lifecycle of a cache entry.

// crates.io
use serde::Serialize;
// self
use crate::_prelude::*;

/// A successfully produced value together with the time it was captured.
#[derive(Clone, Debug)]
pub struct CachedValue<T> {
	/// Value returned by the producer.
	pub value: T,
	/// Monotonic instant the producing attempt started; freshness is measured from here.
	pub produced_at: Instant,
	/// Wall-clock time aligned with `produced_at`, kept for status reporting.
	pub refreshed_at: DateTime<Utc>,
}
impl<T> CachedValue<T> {
	/// Capture a freshly produced value.
	pub fn new(value: T, produced_at: Instant, refreshed_at: DateTime<Utc>) -> Self {
		Self { value, produced_at, refreshed_at }
	}

	/// Whether `produced_at + ttl > now`.
	pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
		match self.expires_at(ttl) {
			Some(expires_at) => expires_at > now,
			// A TTL that overflows the clock never expires.
			None => true,
		}
	}

	/// Instant after which the value is no longer fresh.
	pub fn expires_at(&self, ttl: Duration) -> Option<Instant> {
		self.produced_at.checked_add(ttl)
	}
}

/// Freshness of a cache entry at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
	/// Nothing has been produced yet.
	Empty,
	/// A value is cached and within its TTL.
	Fresh,
	/// A value is cached but its TTL has lapsed.
	Stale,
}

/// Failure recorded for a completed refresh attempt.
#[derive(Clone, Debug)]
pub(crate) struct AttemptFailure {
	pub(crate) attempt: u64,
	pub(crate) error: Arc<Error>,
}
impl AttemptFailure {
	/// Error handed to every caller attached to the failed attempt.
	pub(crate) fn to_error(&self) -> Error {
		Error::Producer { attempt: self.attempt, source: self.error.clone() }
	}
}
