//! Read-only base configuration.
//!
//! The base set is the versioned seed shipped with the service: a list of
//! price adjustments and the default and environment layers of feature
//! flags. Sources may be empty or unavailable; the loader always hands out a
//! well-typed (possibly empty) set.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::models::{FlagOverride, PriceAdjustment, RawFlagEntry};
use serde::Deserialize;
use serde_json::Value;
use shared::clock::SharedClock;

use crate::cache::TtlCache;
use crate::error::StoreError;
use crate::metrics;

/// Flag key to the override one base layer contributes.
pub type FlagLayerMap = BTreeMap<String, FlagOverride>;

/// The two read-only flag layers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseFlags {
    pub defaults: FlagLayerMap,
    pub environment: FlagLayerMap,
}

impl BaseFlags {
    /// Keys present in either layer.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        let mut keys: Vec<&String> = self
            .defaults
            .keys()
            .chain(self.environment.keys())
            .collect();
        keys.sort();
        keys.dedup();
        keys.into_iter()
    }
}

/// Provider of the base configuration.
#[async_trait]
pub trait BaseConfigSource: Send + Sync {
    async fn load_adjustments(&self) -> Result<Vec<PriceAdjustment>, StoreError>;

    async fn load_flag_defaults(&self) -> Result<FlagLayerMap, StoreError>;

    async fn load_flag_environment(&self) -> Result<FlagLayerMap, StoreError>;
}

#[derive(Deserialize)]
struct SeedDocument {
    adjustments: Vec<Value>,
}

/// Decodes a `{"adjustments": [...]}` seed document, skipping entries that
/// do not decode or fail the shape check.
pub fn parse_adjustments(raw: &str) -> Result<Vec<PriceAdjustment>, StoreError> {
    let doc: SeedDocument = serde_json::from_str(raw)?;
    let adjustments = doc
        .adjustments
        .into_iter()
        .filter_map(|entry| {
            let adjustment = match serde_json::from_value::<PriceAdjustment>(entry) {
                Ok(adjustment) => adjustment,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping undecodable base adjustment");
                    return None;
                }
            };
            if let Err(e) = adjustment.validate_shape() {
                tracing::warn!(id = %adjustment.id, error = %e, "Skipping invalid base adjustment");
                return None;
            }
            Some(adjustment)
        })
        .collect();
    Ok(adjustments)
}

/// Decodes a flag layer: an object of key to override, where a bare boolean
/// is shorthand for `{"enabled": bool}`. Undecodable entries are skipped.
pub fn parse_flag_layer(raw: &str) -> Result<FlagLayerMap, StoreError> {
    let entries: BTreeMap<String, Value> = serde_json::from_str(raw)?;
    Ok(entries
        .into_iter()
        .filter_map(|(key, entry)| match serde_json::from_value::<RawFlagEntry>(entry) {
            Ok(raw) => Some((key, FlagOverride::from(raw))),
            Err(e) => {
                tracing::warn!(flag = %key, error = %e, "Skipping undecodable flag entry");
                None
            }
        })
        .collect())
}

/// Reads the seed files from disk and the environment layer from a JSON
/// string.
#[derive(Debug, Clone)]
pub struct FileBaseConfigSource {
    pricing_path: PathBuf,
    flags_path: PathBuf,
    environment_overrides: Option<String>,
}

impl FileBaseConfigSource {
    pub fn new(pricing_path: impl Into<PathBuf>, flags_path: impl Into<PathBuf>) -> Self {
        Self {
            pricing_path: pricing_path.into(),
            flags_path: flags_path.into(),
            environment_overrides: None,
        }
    }

    pub fn with_environment_overrides(mut self, json: Option<String>) -> Self {
        self.environment_overrides = json.filter(|s| !s.trim().is_empty());
        self
    }
}

#[async_trait]
impl BaseConfigSource for FileBaseConfigSource {
    async fn load_adjustments(&self) -> Result<Vec<PriceAdjustment>, StoreError> {
        let raw = tokio::fs::read_to_string(&self.pricing_path)
            .await
            .map_err(|e| StoreError::Backend(format!("{}: {}", self.pricing_path.display(), e)))?;
        parse_adjustments(&raw)
    }

    async fn load_flag_defaults(&self) -> Result<FlagLayerMap, StoreError> {
        match tokio::fs::read_to_string(&self.flags_path).await {
            Ok(raw) => parse_flag_layer(&raw),
            // Shipping without a defaults file is allowed.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FlagLayerMap::new()),
            Err(e) => Err(StoreError::Backend(format!(
                "{}: {}",
                self.flags_path.display(),
                e
            ))),
        }
    }

    async fn load_flag_environment(&self) -> Result<FlagLayerMap, StoreError> {
        match &self.environment_overrides {
            Some(json) => parse_flag_layer(json),
            None => Ok(FlagLayerMap::new()),
        }
    }
}

/// In-memory base configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticBaseConfigSource {
    adjustments: Vec<PriceAdjustment>,
    flags: BaseFlags,
}

impl StaticBaseConfigSource {
    pub fn new(adjustments: Vec<PriceAdjustment>, flags: BaseFlags) -> Self {
        Self { adjustments, flags }
    }

    pub fn with_adjustments(adjustments: Vec<PriceAdjustment>) -> Self {
        Self::new(adjustments, BaseFlags::default())
    }

    pub fn with_flags(flags: BaseFlags) -> Self {
        Self::new(Vec::new(), flags)
    }
}

#[async_trait]
impl BaseConfigSource for StaticBaseConfigSource {
    async fn load_adjustments(&self) -> Result<Vec<PriceAdjustment>, StoreError> {
        Ok(self.adjustments.clone())
    }

    async fn load_flag_defaults(&self) -> Result<FlagLayerMap, StoreError> {
        Ok(self.flags.defaults.clone())
    }

    async fn load_flag_environment(&self) -> Result<FlagLayerMap, StoreError> {
        Ok(self.flags.environment.clone())
    }
}

/// TTL-cached access to a [`BaseConfigSource`].
///
/// Failures are logged and cached as empty sets for the TTL window, so a
/// broken seed file is not re-read on every request.
pub struct BaseConfigLoader {
    source: Arc<dyn BaseConfigSource>,
    adjustments: TtlCache<Vec<PriceAdjustment>>,
    flags: TtlCache<BaseFlags>,
}

impl std::fmt::Debug for BaseConfigLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseConfigLoader").finish_non_exhaustive()
    }
}

impl BaseConfigLoader {
    pub fn new(
        source: Arc<dyn BaseConfigSource>,
        pricing_ttl: Duration,
        flags_ttl: Duration,
        clock: SharedClock,
    ) -> Self {
        Self {
            source,
            adjustments: TtlCache::new(pricing_ttl, clock.clone()),
            flags: TtlCache::new(flags_ttl, clock),
        }
    }

    /// Base adjustments; every call returns an independent copy.
    pub async fn adjustments(&self) -> Vec<PriceAdjustment> {
        self.adjustments
            .get_or_load(|| async {
                match self.source.load_adjustments().await {
                    Ok(adjustments) => {
                        metrics::record_base_reload("pricing", true);
                        tracing::debug!(count = adjustments.len(), "Loaded base adjustments");
                        adjustments
                    }
                    Err(e) => {
                        metrics::record_base_reload("pricing", false);
                        tracing::warn!(error = %e, "Failed to load base adjustments, using empty defaults");
                        Vec::new()
                    }
                }
            })
            .await
    }

    /// Default and environment flag layers; every call returns an
    /// independent copy.
    pub async fn flags(&self) -> BaseFlags {
        self.flags
            .get_or_load(|| async {
                let (defaults, environment) = tokio::join!(
                    self.source.load_flag_defaults(),
                    self.source.load_flag_environment()
                );
                BaseFlags {
                    defaults: Self::layer_or_empty("flag_defaults", defaults),
                    environment: Self::layer_or_empty("flag_environment", environment),
                }
            })
            .await
    }

    fn layer_or_empty(
        source: &'static str,
        result: Result<FlagLayerMap, StoreError>,
    ) -> FlagLayerMap {
        match result {
            Ok(layer) => {
                metrics::record_base_reload(source, true);
                layer
            }
            Err(e) => {
                metrics::record_base_reload(source, false);
                tracing::warn!(source, error = %e, "Failed to load flag layer, using empty defaults");
                FlagLayerMap::new()
            }
        }
    }

    pub async fn invalidate_adjustments(&self) {
        self.adjustments.invalidate().await;
    }

    pub async fn invalidate_flags(&self) {
        self.flags.invalidate().await;
    }
}
