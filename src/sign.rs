//! URL signing: the [`Signer`] capability, its SigV4 implementation, and signing clocks.

pub mod clock;
pub mod presigner;
pub mod sigv4;

pub use self::{
	clock::{ManualClock, SystemClock, TimeBucket, WallClock},
	presigner::S3Presigner,
};

// std
use std::fmt::Debug;
// self
use crate::{_prelude::*, credentials::Credentials};

/// Inputs for one pre-signed GET URL.
#[derive(Clone, Debug)]
pub struct PresignRequest {
	/// Bucket holding the object.
	pub bucket: String,
	/// Object key.
	pub key: String,
	/// Credentials to sign with instead of the signer's ambient ones.
	pub credentials: Option<Credentials>,
	/// Signing time to use instead of the current time.
	pub signing_time: Option<DateTime<Utc>>,
	/// Lifetime of the URL, counted from the signing time.
	pub expires_in: Duration,
}

/// Produces time-limited retrieval URLs for stored objects.
pub trait Signer: Send + Sync + Debug {
	/// Sign a GET for `request`, returning the URL as a string.
	fn presign(&self, request: &PresignRequest) -> Result<String>;
}
