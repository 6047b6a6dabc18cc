//! Override backing stores.
//!
//! A backend is a dumb string key/value store with optional expiry. JSON
//! encoding, scoping and fail-open policy live in
//! [`OverrideStore`](crate::override_store::OverrideStore).

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

pub mod memory;
pub mod redis;

pub use self::memory::InMemoryOverrideBackend;
pub use self::redis::RedisOverrideBackend;

#[async_trait]
pub trait OverrideBackend: Send + Sync {
    /// Short name used in logs.
    fn backend_name(&self) -> &'static str;

    /// Raw payload stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replaces the payload under `key`. `ttl` of `None` keeps it until
    /// overwritten.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Round trip used by readiness checks.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
