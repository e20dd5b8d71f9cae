//! Expiring Cache - An in-memory key-value cache with per-entry TTL
//!
//! Entries are evicted by a scheduled timer when their TTL elapses and are
//! also checked lazily on every read. An optional HTTP server exposes the
//! cache over a small JSON API.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;

pub use api::AppState;
pub use cache::{
    BlankKey, CacheStats, Clock, ExpiringCache, ManualCache, ManualClock, ManualScheduler,
    Scheduler, TokioClock, TokioScheduler, DEFAULT_TTL,
};
pub use config::Config;
pub use error::{CacheError, Result};
