//! Process-local override backends.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::clock::{system_clock, SharedClock};
use tokio::sync::RwLock;

use super::OverrideBackend;
use crate::error::StoreError;

#[derive(Debug, Clone)]
struct StoredValue {
    payload: String,
    expires_at: Option<DateTime<Utc>>,
}

/// In-memory backend with optional per-key expiry.
///
/// Used when Redis is disabled and as the backing store in tests.
#[derive(Debug)]
pub struct InMemoryOverrideBackend {
    clock: SharedClock,
    values: RwLock<HashMap<String, StoredValue>>,
}

impl Default for InMemoryOverrideBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOverrideBackend {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            clock,
            values: RwLock::new(HashMap::new()),
        }
    }

    /// Stores a raw payload without any validation, e.g. to seed malformed
    /// data in tests.
    pub async fn insert_raw(&self, key: impl Into<String>, payload: impl Into<String>) {
        self.values.write().await.insert(
            key.into(),
            StoredValue {
                payload: payload.into(),
                expires_at: None,
            },
        );
    }

    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        self.values
            .read()
            .await
            .values()
            .filter(|v| v.expires_at.map_or(true, |at| now < at))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl OverrideBackend for InMemoryOverrideBackend {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let values = self.values.read().await;
        Ok(values
            .get(key)
            .filter(|v| v.expires_at.map_or(true, |at| now < at))
            .map(|v| v.payload.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = match ttl.filter(|t| !t.is_zero()) {
            Some(ttl) => Some(
                self.clock.now()
                    + chrono::Duration::from_std(ttl)
                        .map_err(|e| StoreError::Backend(e.to_string()))?,
            ),
            None => None,
        };
        self.values.write().await.insert(
            key.to_string(),
            StoredValue {
                payload: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }
}
