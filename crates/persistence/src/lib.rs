//! Persistence layer for the POS rules engine.
//!
//! This crate contains:
//! - In-process TTL caches
//! - The base config source and its cached loader
//! - Override backends (Redis, in-memory) and the scoped override store

pub mod backends;
pub mod base_config;
pub mod cache;
pub mod error;
pub mod metrics;
pub mod override_store;

pub use backends::{InMemoryOverrideBackend, OverrideBackend, RedisOverrideBackend};
pub use base_config::{
    BaseConfigLoader, BaseConfigSource, BaseFlags, FileBaseConfigSource, FlagLayerMap,
    StaticBaseConfigSource,
};
pub use cache::{KeyedTtlCache, TtlCache};
pub use error::StoreError;
pub use override_store::{FlagOverrideMap, OverrideScope, OverrideStore};
