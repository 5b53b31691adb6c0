//! Retry bookkeeping for one upstream call.

// self
use crate::{_prelude::*, config::RetryPolicy, http::client::is_retryable};

/// Tracks retries and the overall deadline of a single logical request.
#[derive(Debug)]
pub struct RetryState<'a> {
	policy: &'a RetryPolicy,
	deadline: Instant,
	retries: u32,
}
impl<'a> RetryState<'a> {
	/// Start the deadline clock for `policy`.
	pub fn new(policy: &'a RetryPolicy) -> Self {
		Self { policy, deadline: Instant::now() + policy.deadline, retries: 0 }
	}

	/// Timeout for the next attempt, clamped to what is left of the deadline.
	///
	/// `None` once the deadline has passed.
	pub fn attempt_timeout(&self) -> Option<Duration> {
		let timeout = self.remaining().min(self.policy.attempt_timeout);

		(!timeout.is_zero()).then_some(timeout)
	}

	/// Delay to wait before retrying after `err`.
	///
	/// `None` when `err` is final or the retry allowance is spent.
	pub fn backoff_after(&mut self, err: &Error) -> Option<Duration> {
		if !is_retryable(err) || self.retries >= self.policy.max_retries {
			return None;
		}

		let delay = self.policy.compute_backoff(self.retries).min(self.remaining());

		self.retries += 1;

		Some(delay)
	}

	/// Retries granted so far.
	pub fn retries(&self) -> u32 {
		self.retries
	}

	fn remaining(&self) -> Duration {
		self.deadline.saturating_duration_since(Instant::now())
	}
}
