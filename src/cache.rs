//! Single-flight TTL cache for one asynchronously produced value.

pub mod entry;
pub mod manager;
pub mod state;

pub use self::{
	manager::{CacheSnapshot, Producer, SingleFlight},
	state::{CacheStatus, CachedValue},
};
