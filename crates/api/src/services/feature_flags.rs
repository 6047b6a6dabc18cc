//! Feature flag service.
//!
//! Flags resolve across four layers: the shipped defaults file, the
//! environment layer from configuration, the global override scope and the
//! tenant override scope. Overrides are read through an in-process cache
//! that is dropped on every write from this process.

use std::collections::BTreeSet;
use std::sync::Arc;

use domain::models::{
    validate_flag_key, ActiveSource, Actor, EvaluationContext, FeatureFlag, FlagOverride,
    FlagScope, FlagView, Rollout, UpdateFlagRequest,
};
use domain::services::{evaluate_flag, resolve_flag, FlagLayers};
use domain::DomainError;
use persistence::{BaseConfigLoader, BaseFlags, FlagOverrideMap, OverrideScope, OverrideStore};
use shared::clock::SharedClock;
use tracing::{debug, info};

use crate::middleware::metrics::record_flag_evaluation;

/// Every layer needed to resolve flags for one tenant.
#[derive(Debug, Default)]
struct FlagSnapshot {
    base: BaseFlags,
    global: FlagOverrideMap,
    tenant: FlagOverrideMap,
}

impl FlagSnapshot {
    fn keys(&self) -> BTreeSet<&String> {
        self.base
            .keys()
            .chain(self.global.keys())
            .chain(self.tenant.keys())
            .collect()
    }

    fn resolve(&self, key: &str) -> Option<FeatureFlag> {
        let layers = FlagLayers {
            default: self.base.defaults.get(key),
            environment: self.base.environment.get(key),
            global: self.global.get(key),
            tenant: self.tenant.get(key),
        };
        if layers.is_empty() {
            return None;
        }
        Some(resolve_flag(key, layers).record)
    }
}

pub struct FeatureFlagService {
    base: Arc<BaseConfigLoader>,
    overrides: OverrideStore,
    allow_runtime_updates: bool,
    clock: SharedClock,
}

impl std::fmt::Debug for FeatureFlagService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureFlagService")
            .field("overrides", &self.overrides)
            .field("allow_runtime_updates", &self.allow_runtime_updates)
            .finish_non_exhaustive()
    }
}

impl FeatureFlagService {
    pub fn new(
        base: Arc<BaseConfigLoader>,
        overrides: OverrideStore,
        allow_runtime_updates: bool,
        clock: SharedClock,
    ) -> Self {
        Self {
            base,
            overrides,
            allow_runtime_updates,
            clock,
        }
    }

    pub fn allow_runtime_updates(&self) -> bool {
        self.allow_runtime_updates
    }

    /// Number of flags in the defaults and environment layers.
    pub async fn base_flag_count(&self) -> usize {
        self.base.flags().await.keys().count()
    }

    async fn snapshot(&self, tenant_id: Option<&str>) -> FlagSnapshot {
        let tenant_scope = match OverrideScope::for_tenant(tenant_id) {
            OverrideScope::Global => None,
            scope => Some(scope),
        };
        let (base, global, tenant) = tokio::join!(
            self.base.flags(),
            self.overrides.get_flag_overrides(&OverrideScope::Global),
            async {
                match &tenant_scope {
                    Some(scope) => self.overrides.get_flag_overrides(scope).await,
                    None => FlagOverrideMap::new(),
                }
            }
        );
        FlagSnapshot {
            base,
            global,
            tenant,
        }
    }

    /// Every known flag for `tenant_id`, sorted by key, evaluated for
    /// `context`.
    pub async fn list_flags(
        &self,
        tenant_id: Option<&str>,
        context: &EvaluationContext,
        include_metadata: bool,
    ) -> Vec<FlagView> {
        let snapshot = self.snapshot(tenant_id).await;
        snapshot
            .keys()
            .into_iter()
            .filter_map(|key| snapshot.resolve(key))
            .map(|flag| {
                let evaluation = evaluate_flag(&flag, context);
                FlagView::new(flag, evaluation, include_metadata)
            })
            .collect()
    }

    /// One flag, or `None` when no layer knows the key.
    pub async fn get_flag(
        &self,
        key: &str,
        tenant_id: Option<&str>,
        context: &EvaluationContext,
        include_metadata: bool,
    ) -> Option<FlagView> {
        let flag = self.snapshot(tenant_id).await.resolve(key)?;
        let evaluation = evaluate_flag(&flag, context);
        Some(FlagView::new(flag, evaluation, include_metadata))
    }

    /// Decision for `context`, resolving tenant overrides from
    /// `context.tenant_id`. Unknown flags are off.
    pub async fn evaluate(&self, key: &str, context: &EvaluationContext) -> bool {
        let flag = self
            .snapshot(context.tenant_id.as_deref())
            .await
            .resolve(key);
        let result = flag.as_ref().is_some_and(|f| evaluate_flag(f, context));

        record_flag_evaluation(key, result);
        debug!(
            flag = key,
            known = flag.is_some(),
            identity = context.rollout_identity(),
            result,
            "Evaluated feature flag"
        );
        result
    }

    /// Highest-precedence layer contributing to `key` for `tenant_id`.
    pub async fn active_source(&self, key: &str, tenant_id: Option<&str>) -> ActiveSource {
        self.snapshot(tenant_id)
            .await
            .resolve(key)
            .map_or(ActiveSource::Unknown, |flag| flag.active_source())
    }

    fn target_scope(
        scope: FlagScope,
        tenant_id: Option<&str>,
    ) -> Result<OverrideScope, DomainError> {
        match scope {
            FlagScope::Global => Ok(OverrideScope::Global),
            FlagScope::Tenant => match OverrideScope::for_tenant(tenant_id) {
                OverrideScope::Global => Err(DomainError::ScopeRequired),
                tenant => Ok(tenant),
            },
        }
    }

    /// Replaces `key`'s override in one scope and returns the flag as
    /// `tenant_id` now sees it.
    pub async fn update_flag(
        &self,
        key: &str,
        request: UpdateFlagRequest,
        scope: FlagScope,
        tenant_id: Option<&str>,
        actor: &Actor,
    ) -> Result<FlagView, DomainError> {
        if !self.allow_runtime_updates {
            return Err(DomainError::RuntimeUpdatesDisabled);
        }
        validate_flag_key(key)?;
        request.check()?;
        let target = Self::target_scope(scope, tenant_id)?;

        // Read fresh so the merge does not start from a stale cached map.
        self.overrides.invalidate(&target).await;
        let mut overrides = self.overrides.get_flag_overrides(&target).await;

        let entry = FlagOverride {
            enabled: Some(request.enabled),
            rollout: Some(request.rollout.unwrap_or_else(Rollout::all).normalized()),
            notes: Some(request.notes),
            updated_at: Some(self.clock.now()),
            updated_by: actor.id.clone(),
            updated_by_name: actor.name.clone(),
            ..Default::default()
        };
        overrides.insert(key.to_string(), entry);

        self.overrides.put_flag_overrides(&target, &overrides).await?;
        self.base.invalidate_flags().await;
        info!(flag = key, scope = %target, enabled = request.enabled, "Feature flag updated");

        self.view_after_write(key, tenant_id).await
    }

    /// Drops `key`'s override from one scope, if present, and returns the
    /// flag as `tenant_id` now sees it.
    pub async fn remove_override(
        &self,
        key: &str,
        scope: FlagScope,
        tenant_id: Option<&str>,
    ) -> Result<Option<FlagView>, DomainError> {
        let target = Self::target_scope(scope, tenant_id)?;

        self.overrides.invalidate(&target).await;
        let mut overrides = self.overrides.get_flag_overrides(&target).await;
        if overrides.remove(key).is_some() {
            self.overrides.put_flag_overrides(&target, &overrides).await?;
            info!(flag = key, scope = %target, "Feature flag override removed");
        }
        self.base.invalidate_flags().await;

        let context = Self::tenant_context(tenant_id);
        Ok(self.get_flag(key, tenant_id, &context, true).await)
    }

    async fn view_after_write(
        &self,
        key: &str,
        tenant_id: Option<&str>,
    ) -> Result<FlagView, DomainError> {
        let context = Self::tenant_context(tenant_id);
        self.get_flag(key, tenant_id, &context, true)
            .await
            .ok_or_else(|| DomainError::NotFound(format!("feature flag {}", key)))
    }

    fn tenant_context(tenant_id: Option<&str>) -> EvaluationContext {
        match tenant_id {
            Some(id) => EvaluationContext::new().with_tenant(id),
            None => EvaluationContext::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::{InMemoryOverrideBackend, StaticBaseConfigSource};
    use shared::clock::system_clock;
    use std::time::Duration;

    fn service(allow_runtime_updates: bool) -> FeatureFlagService {
        let mut flags = BaseFlags::default();
        flags
            .defaults
            .insert("new_menu".into(), FlagOverride::enabled(true));
        let loader = BaseConfigLoader::new(
            Arc::new(StaticBaseConfigSource::with_flags(flags)),
            Duration::from_secs(30),
            Duration::from_secs(15),
            system_clock(),
        );
        let store = OverrideStore::new("feature-flags", Arc::new(InMemoryOverrideBackend::new()))
            .with_read_cache(Duration::from_secs(15), system_clock());
        FeatureFlagService::new(Arc::new(loader), store, allow_runtime_updates, system_clock())
    }

    #[tokio::test]
    async fn test_update_rejected_when_runtime_updates_disabled() {
        let err = service(false)
            .update_flag(
                "new_menu",
                UpdateFlagRequest::new(false),
                FlagScope::Global,
                None,
                &Actor::anonymous(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::RuntimeUpdatesDisabled);
    }

    #[tokio::test]
    async fn test_tenant_scope_requires_tenant() {
        let err = service(true)
            .update_flag(
                "new_menu",
                UpdateFlagRequest::new(false),
                FlagScope::Tenant,
                Some("  "),
                &Actor::anonymous(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::ScopeRequired);
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let err = service(true)
            .update_flag(
                "Bad Key",
                UpdateFlagRequest::new(true),
                FlagScope::Global,
                None,
                &Actor::anonymous(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_flag_is_off() {
        let service = service(true);
        assert!(!service.evaluate("missing", &EvaluationContext::new()).await);
        assert!(service.evaluate("new_menu", &EvaluationContext::new()).await);
        assert_eq!(
            service.active_source("missing", None).await,
            ActiveSource::Unknown
        );
    }
}
