//! Bus Tracker - Bus tracking API with resilient caching and rate limiting
//!
//! Reads go through a cache facade that never fails a request; every route
//! group sits behind a tiered, fail-open rate limiter.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod ratelimit;
pub mod store;
pub mod tasks;

#[cfg(test)]
mod test_support;

pub use api::{create_router, AppState};
pub use cache::CacheFacade;
pub use config::Config;
pub use ratelimit::RateLimiter;
