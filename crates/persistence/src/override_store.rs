//! Scoped runtime overrides.
//!
//! Each scope (`global` or `tenant:<id>`) owns one JSON document stored under
//! `"<namespace>:<scope>"`. Writes replace the whole document. Reads never
//! fail: an unreachable backend, a missing key or a malformed payload all
//! resolve to "no override" and are logged.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use domain::models::{FlagOverride, PriceAdjustment, RawFlagEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::clock::SharedClock;

use crate::backends::OverrideBackend;
use crate::cache::KeyedTtlCache;
use crate::error::StoreError;
use crate::metrics;

/// Flag key to the override a scope contributes.
pub type FlagOverrideMap = BTreeMap<String, FlagOverride>;

/// Target of an override read or write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OverrideScope {
    Global,
    Tenant(String),
}

impl OverrideScope {
    pub fn tenant(tenant_id: impl Into<String>) -> Self {
        OverrideScope::Tenant(tenant_id.into())
    }

    /// Tenant scope when an id is present and non-blank, global otherwise.
    pub fn for_tenant(tenant_id: Option<&str>) -> Self {
        match tenant_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => OverrideScope::tenant(id),
            None => OverrideScope::Global,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, OverrideScope::Global)
    }
}

impl std::fmt::Display for OverrideScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverrideScope::Global => write!(f, "global"),
            OverrideScope::Tenant(id) => write!(f, "tenant:{}", id),
        }
    }
}

#[derive(Serialize)]
struct AdjustmentDocument<'a> {
    adjustments: &'a [PriceAdjustment],
}

#[derive(Deserialize)]
struct RawAdjustmentDocument {
    adjustments: Vec<Value>,
}

/// Namespaced override access over a backend.
pub struct OverrideStore {
    namespace: String,
    backend: Arc<dyn OverrideBackend>,
    write_ttl: Option<Duration>,
    read_cache: Option<KeyedTtlCache<Option<String>>>,
}

impl std::fmt::Debug for OverrideStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverrideStore")
            .field("namespace", &self.namespace)
            .field("backend", &self.backend.backend_name())
            .field("write_ttl", &self.write_ttl)
            .field("read_cache", &self.read_cache.is_some())
            .finish()
    }
}

impl OverrideStore {
    pub fn new(namespace: impl Into<String>, backend: Arc<dyn OverrideBackend>) -> Self {
        Self {
            namespace: namespace.into(),
            backend,
            write_ttl: None,
            read_cache: None,
        }
    }

    /// Expiry applied to every write. `None` or zero keeps documents until
    /// they are overwritten.
    pub fn with_write_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.write_ttl = ttl.filter(|t| !t.is_zero());
        self
    }

    /// Keeps raw documents in process for `ttl`; a successful write drops
    /// the scope's entry so this process sees its own change immediately.
    pub fn with_read_cache(mut self, ttl: Duration, clock: SharedClock) -> Self {
        self.read_cache = Some(KeyedTtlCache::new(ttl, clock));
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn scope_key(&self, scope: &OverrideScope) -> String {
        format!("{}:{}", self.namespace, scope)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Checks that the backend answers.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.backend.ping().await
    }

    /// Drops the cached document for `scope`, if any.
    pub async fn invalidate(&self, scope: &OverrideScope) {
        if let Some(cache) = &self.read_cache {
            cache.invalidate(&self.scope_key(scope)).await;
        }
    }

    fn degrade(&self, scope: &OverrideScope, reason: &str, error: &dyn std::fmt::Display) {
        metrics::record_override_read_failure(&self.namespace);
        tracing::warn!(
            namespace = %self.namespace,
            scope = %scope,
            error = %error,
            "{}, continuing without overrides",
            reason
        );
    }

    async fn read_document(&self, scope: &OverrideScope) -> Option<Value> {
        let key = self.scope_key(scope);

        // The generation is taken before the backend read so a write that
        // lands in between keeps this (older) document out of the cache.
        let (cached, generation) = match &self.read_cache {
            Some(cache) => (cache.get(&key).await, Some(cache.generation(&key).await)),
            None => (None, None),
        };
        let raw = match cached {
            Some(raw) => raw,
            None => match self.backend.get(&key).await {
                Ok(raw) => {
                    if let (Some(cache), Some(generation)) = (&self.read_cache, generation) {
                        cache.put_if_generation(key.clone(), generation, raw.clone()).await;
                    }
                    raw
                }
                Err(e) => {
                    self.degrade(scope, "Failed to read overrides", &e);
                    return None;
                }
            },
        };

        let raw = raw?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Null) => None,
            Ok(document) => Some(document),
            Err(e) => {
                self.degrade(scope, "Malformed override payload", &e);
                None
            }
        }
    }

    async fn write_document(&self, scope: &OverrideScope, payload: &str) -> Result<(), StoreError> {
        let key = self.scope_key(scope);
        let result = self.backend.set(&key, payload, self.write_ttl).await;
        metrics::record_override_write(&self.namespace, result.is_ok());

        match result {
            Ok(()) => {
                self.invalidate(scope).await;
                tracing::debug!(namespace = %self.namespace, scope = %scope, "Overrides written");
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    namespace = %self.namespace,
                    scope = %scope,
                    error = %e,
                    "Failed to write overrides"
                );
                Err(e)
            }
        }
    }

    /// Adjustments stored for `scope`. Entries that do not decode or fail the
    /// per-kind shape check are skipped.
    pub async fn get_adjustments(&self, scope: &OverrideScope) -> Vec<PriceAdjustment> {
        let Some(document) = self.read_document(scope).await else {
            return Vec::new();
        };
        let entries = match serde_json::from_value::<RawAdjustmentDocument>(document) {
            Ok(doc) => doc.adjustments,
            Err(e) => {
                self.degrade(scope, "Override document has no adjustments array", &e);
                return Vec::new();
            }
        };

        entries
            .into_iter()
            .filter_map(|entry| {
                let adjustment = match serde_json::from_value::<PriceAdjustment>(entry) {
                    Ok(adjustment) => adjustment,
                    Err(e) => {
                        self.degrade(scope, "Skipping undecodable adjustment", &e);
                        return None;
                    }
                };
                match adjustment.validate_shape() {
                    Ok(()) => Some(adjustment),
                    Err(e) => {
                        self.degrade(scope, "Skipping invalid adjustment", &e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Replaces the adjustments stored for `scope`.
    pub async fn put_adjustments(
        &self,
        scope: &OverrideScope,
        adjustments: &[PriceAdjustment],
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&AdjustmentDocument { adjustments })?;
        self.write_document(scope, &payload).await
    }

    /// Flag overrides stored for `scope`. Entries that do not decode are
    /// skipped.
    pub async fn get_flag_overrides(&self, scope: &OverrideScope) -> FlagOverrideMap {
        let Some(document) = self.read_document(scope).await else {
            return FlagOverrideMap::new();
        };
        let Value::Object(entries) = document else {
            self.degrade(scope, "Override document is not an object", &"expected a JSON object");
            return FlagOverrideMap::new();
        };

        entries
            .into_iter()
            .filter_map(|(key, entry)| match serde_json::from_value::<RawFlagEntry>(entry) {
                Ok(raw) => Some((key, FlagOverride::from(raw))),
                Err(e) => {
                    self.degrade(scope, "Skipping undecodable flag override", &e);
                    None
                }
            })
            .collect()
    }

    /// Replaces the flag overrides stored for `scope`.
    pub async fn put_flag_overrides(
        &self,
        scope: &OverrideScope,
        overrides: &FlagOverrideMap,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_string(overrides)?;
        self.write_document(scope, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryOverrideBackend;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use domain::models::{AdjustmentKind, Rollout};
    use shared::clock::ManualClock;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    struct UnreachableBackend;

    #[async_trait]
    impl OverrideBackend for UnreachableBackend {
        fn backend_name(&self) -> &'static str {
            "unreachable"
        }

        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Connection("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<(), StoreError> {
            Err(StoreError::Connection("connection refused".into()))
        }
    }

    /// Holds the first `get` after it has read the backend, until released.
    struct SlowFirstReadBackend {
        inner: InMemoryOverrideBackend,
        held: AtomicBool,
        read_taken: Notify,
        release: Notify,
    }

    impl SlowFirstReadBackend {
        fn new() -> Self {
            Self {
                inner: InMemoryOverrideBackend::new(),
                held: AtomicBool::new(false),
                read_taken: Notify::new(),
                release: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl OverrideBackend for SlowFirstReadBackend {
        fn backend_name(&self) -> &'static str {
            "slow"
        }

        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            let value = self.inner.get(key).await?;
            if !self.held.swap(true, Ordering::SeqCst) {
                self.read_taken.notify_one();
                self.release.notified().await;
            }
            Ok(value)
        }

        async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
            self.inner.set(key, value, ttl).await
        }
    }

    fn rule(id: &str) -> PriceAdjustment {
        let mut adj = PriceAdjustment::blank(id);
        adj.name = id.to_string();
        adj.value = Some(10.0);
        adj
    }

    fn store(backend: Arc<InMemoryOverrideBackend>) -> OverrideStore {
        OverrideStore::new("dynamic-pricing", backend)
    }

    #[test]
    fn test_scope_keys() {
        let store = OverrideStore::new("feature-flags", Arc::new(InMemoryOverrideBackend::new()));
        assert_eq!(store.scope_key(&OverrideScope::Global), "feature-flags:global");
        assert_eq!(
            store.scope_key(&OverrideScope::tenant("42")),
            "feature-flags:tenant:42"
        );
    }

    #[test]
    fn test_scope_for_tenant() {
        assert_eq!(OverrideScope::for_tenant(None), OverrideScope::Global);
        assert_eq!(OverrideScope::for_tenant(Some("  ")), OverrideScope::Global);
        assert_eq!(OverrideScope::for_tenant(Some("7")), OverrideScope::tenant("7"));
    }

    #[tokio::test]
    async fn test_adjustments_round_trip_through_backend() {
        let backend = Arc::new(InMemoryOverrideBackend::new());
        let store = store(backend.clone());
        let scope = OverrideScope::tenant("42");

        assert!(store.get_adjustments(&scope).await.is_empty());
        store.put_adjustments(&scope, &[rule("a"), rule("b")]).await.unwrap();

        let stored = store.get_adjustments(&scope).await;
        assert_eq!(stored, vec![rule("a"), rule("b")]);

        let raw = backend.get("dynamic-pricing:tenant:42").await.unwrap().unwrap();
        let doc: Value = serde_json::from_str(&raw).unwrap();
        assert!(doc["adjustments"].is_array());
    }

    #[tokio::test]
    async fn test_malformed_payloads_read_as_empty() {
        let backend = Arc::new(InMemoryOverrideBackend::new());
        let store = store(backend.clone());

        backend.insert_raw("dynamic-pricing:global", "{not json").await;
        assert!(store.get_adjustments(&OverrideScope::Global).await.is_empty());

        backend
            .insert_raw("dynamic-pricing:global", r#"{"adjustments": 5}"#)
            .await;
        assert!(store.get_adjustments(&OverrideScope::Global).await.is_empty());

        backend.insert_raw("dynamic-pricing:global", "null").await;
        assert!(store.get_adjustments(&OverrideScope::Global).await.is_empty());
    }

    #[tokio::test]
    async fn test_bad_entries_are_skipped_individually() {
        let backend = Arc::new(InMemoryOverrideBackend::new());
        let store = store(backend.clone());

        backend
            .insert_raw(
                "dynamic-pricing:tenant:1",
                r#"{"adjustments": [
                    {"id": "ok", "type": "percentage", "value": 10},
                    {"id": "bad-type", "type": "bogus"},
                    {"id": "no-price", "type": "fixed"},
                    "garbage",
                    {"id": "fixed", "type": "fixed", "fixedPrice": 9.5}
                ]}"#,
            )
            .await;

        let stored = store.get_adjustments(&OverrideScope::tenant("1")).await;
        let ids: Vec<&str> = stored.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["ok", "fixed"]);
        assert_eq!(stored[1].kind, AdjustmentKind::Fixed);
    }

    #[tokio::test]
    async fn test_failing_backend_reads_empty_and_writes_error() {
        let store = OverrideStore::new("feature-flags", Arc::new(UnreachableBackend));

        assert!(store.get_flag_overrides(&OverrideScope::Global).await.is_empty());
        assert!(store.get_adjustments(&OverrideScope::Global).await.is_empty());

        let result = store
            .put_flag_overrides(&OverrideScope::Global, &FlagOverrideMap::new())
            .await;
        assert!(matches!(result, Err(StoreError::Connection(_))));
    }

    #[tokio::test]
    async fn test_flag_overrides_round_trip() {
        let backend = Arc::new(InMemoryOverrideBackend::new());
        let store = OverrideStore::new("feature-flags", backend.clone());

        let mut overrides = FlagOverrideMap::new();
        overrides.insert(
            "beta_checkout".into(),
            FlagOverride {
                enabled: Some(true),
                rollout: Some(Rollout::percentage(25.0)),
                notes: Some(None),
                ..Default::default()
            },
        );
        store
            .put_flag_overrides(&OverrideScope::tenant("42"), &overrides)
            .await
            .unwrap();

        let read = store.get_flag_overrides(&OverrideScope::tenant("42")).await;
        assert_eq!(read, overrides);
    }

    #[tokio::test]
    async fn test_flag_entries_skip_bad_and_accept_shorthand() {
        let backend = Arc::new(InMemoryOverrideBackend::new());
        let store = OverrideStore::new("feature-flags", backend.clone());
        backend
            .insert_raw(
                "feature-flags:global",
                r#"{"a": {"enabled": true}, "b": false, "c": {"enabled": "yes"}}"#,
            )
            .await;

        let read = store.get_flag_overrides(&OverrideScope::Global).await;
        assert_eq!(read.len(), 2);
        assert_eq!(read["a"].enabled, Some(true));
        assert_eq!(read["b"].enabled, Some(false));

        backend.insert_raw("feature-flags:global", "[1, 2]").await;
        assert!(store.get_flag_overrides(&OverrideScope::Global).await.is_empty());
    }

    #[tokio::test]
    async fn test_read_cache_hides_foreign_writes_until_expiry() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let backend = Arc::new(InMemoryOverrideBackend::with_clock(clock.clone()));
        let store = OverrideStore::new("feature-flags", backend.clone())
            .with_read_cache(Duration::from_secs(15), clock.clone());
        let scope = OverrideScope::Global;

        assert!(store.get_flag_overrides(&scope).await.is_empty());

        // Another process writes directly to the backend.
        backend
            .insert_raw("feature-flags:global", r#"{"a": true}"#)
            .await;
        assert!(store.get_flag_overrides(&scope).await.is_empty());

        clock.advance(chrono::Duration::seconds(15));
        assert_eq!(store.get_flag_overrides(&scope).await.len(), 1);
    }

    #[tokio::test]
    async fn test_own_write_invalidates_read_cache() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let backend = Arc::new(InMemoryOverrideBackend::with_clock(clock.clone()));
        let store = OverrideStore::new("feature-flags", backend)
            .with_read_cache(Duration::from_secs(15), clock);
        let scope = OverrideScope::tenant("9");

        assert!(store.get_flag_overrides(&scope).await.is_empty());

        let mut overrides = FlagOverrideMap::new();
        overrides.insert("a".into(), FlagOverride::enabled(true));
        store.put_flag_overrides(&scope, &overrides).await.unwrap();

        assert_eq!(store.get_flag_overrides(&scope).await, overrides);
    }

    #[tokio::test]
    async fn test_write_ttl_expires_documents() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let backend = Arc::new(InMemoryOverrideBackend::with_clock(clock.clone()));
        let store = store(backend).with_write_ttl(Some(Duration::from_secs(30)));
        let scope = OverrideScope::Global;

        store.put_adjustments(&scope, &[rule("a")]).await.unwrap();
        assert_eq!(store.get_adjustments(&scope).await.len(), 1);

        clock.advance(chrono::Duration::seconds(31));
        assert!(store.get_adjustments(&scope).await.is_empty());
    }

    #[tokio::test]
    async fn test_read_overlapping_own_write_does_not_cache_old_document() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let backend = Arc::new(SlowFirstReadBackend::new());
        let store = Arc::new(
            OverrideStore::new("feature-flags", backend.clone())
                .with_read_cache(Duration::from_secs(15), clock),
        );
        let scope = OverrideScope::Global;

        let reader = {
            let store = store.clone();
            tokio::spawn(async move { store.get_flag_overrides(&OverrideScope::Global).await })
        };
        backend.read_taken.notified().await;

        let mut overrides = FlagOverrideMap::new();
        overrides.insert("a".into(), FlagOverride::enabled(true));
        store.put_flag_overrides(&scope, &overrides).await.unwrap();

        backend.release.notify_one();
        // The overlapping read still returns what it saw.
        assert!(reader.await.unwrap().is_empty());

        assert_eq!(store.get_flag_overrides(&scope).await, overrides);
    }
}
