//! Wall-clock sources and signing time buckets.

// std
use std::{
	fmt::Debug,
	sync::{Mutex, PoisonError},
};
// self
use crate::_prelude::*;

/// Source of wall-clock time for signing.
pub trait WallClock: Send + Sync + Debug {
	/// Current UTC time.
	fn now(&self) -> DateTime<Utc>;
}

/// [`WallClock`] backed by the system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl WallClock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// [`WallClock`] that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
	now: Mutex<DateTime<Utc>>,
}
impl ManualClock {
	/// Start the clock at `now`.
	pub fn new(now: DateTime<Utc>) -> Self {
		Self { now: Mutex::new(now) }
	}

	/// Jump to `now`.
	pub fn set(&self, now: DateTime<Utc>) {
		*self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
	}

	/// Move forward by `delta`.
	pub fn advance(&self, delta: TimeDelta) {
		let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);

		*now += delta;
	}
}
impl WallClock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

/// Truncates timestamps to the start of fixed-width windows.
///
/// Every instant inside one window maps to the same signing time, so repeated requests produce
/// byte-identical URLs until the window rolls over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeBucket {
	width_ms: i64,
}
impl TimeBucket {
	/// Create buckets of `width`; the width must be at least one millisecond.
	pub fn new(width: Duration) -> Result<Self> {
		let width_ms = i64::try_from(width.as_millis()).unwrap_or(i64::MAX);

		if width_ms < 1 {
			return Err(Error::Validation {
				field: "bucket_width",
				reason: "Must be at least 1 millisecond.".into(),
			});
		}

		Ok(Self { width_ms })
	}

	/// Bucket width.
	pub fn width(&self) -> Duration {
		Duration::from_millis(self.width_ms as u64)
	}

	/// `floor(at / width) * width`, at millisecond precision.
	pub fn floor(&self, at: DateTime<Utc>) -> Result<DateTime<Utc>> {
		let millis = at.timestamp_millis();
		let floored = millis.div_euclid(self.width_ms) * self.width_ms;

		DateTime::from_timestamp_millis(floored).ok_or_else(|| Error::Validation {
			field: "signing_time",
			reason: format!("{at} cannot be truncated to a {}ms bucket.", self.width_ms),
		})
	}
}
