//! HTTP helpers for AWS JSON API calls.

pub mod client;
pub mod retry;
