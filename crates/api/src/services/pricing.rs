//! Dynamic pricing service.
//!
//! Combines the cached base adjustments with the tenant's runtime overrides
//! and runs the pricing evaluator over the merged set. Tenant writes are
//! read-merge-write of the whole scope document.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::models::{
    Actor, AdjustmentPatch, AdjustmentStatus, EntityId, PriceAdjustment, PriceEvaluation,
    PriceQuery, UpsertAdjustmentRequest,
};
use domain::services::{self as engine, LayeredRecord};
use domain::DomainError;
use persistence::{BaseConfigLoader, OverrideScope, OverrideStore, StoreError};
use shared::clock::SharedClock;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::middleware::metrics::record_price_evaluation;

/// Filters for listing adjustments.
#[derive(Debug, Clone, Default)]
pub struct ListAdjustmentsQuery {
    pub tenant_id: Option<String>,
    pub branch_id: Option<EntityId>,
    pub include_expired: bool,
}

pub struct PricingService {
    base: Arc<BaseConfigLoader>,
    overrides: OverrideStore,
    clock: SharedClock,
}

impl std::fmt::Debug for PricingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PricingService")
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

impl PricingService {
    pub fn new(base: Arc<BaseConfigLoader>, overrides: OverrideStore, clock: SharedClock) -> Self {
        Self {
            base,
            overrides,
            clock,
        }
    }

    pub fn namespace(&self) -> &str {
        self.overrides.namespace()
    }

    pub fn backend_name(&self) -> &'static str {
        self.overrides.backend_name()
    }

    /// Round trip to the override backend.
    pub async fn ping_overrides(&self) -> Result<(), StoreError> {
        self.overrides.ping().await
    }

    pub async fn base_adjustment_count(&self) -> usize {
        self.base.adjustments().await.len()
    }

    /// Base and scope overrides, fetched concurrently and merged by id.
    async fn merged(&self, scope: &OverrideScope) -> Vec<PriceAdjustment> {
        let (base, overrides) = tokio::join!(
            self.base.adjustments(),
            self.overrides.get_adjustments(scope)
        );
        engine::merge_adjustments(&base, &overrides)
    }

    /// Merged adjustments visible to a tenant, in evaluation order.
    ///
    /// Archived rules are never listed; ended rules only with
    /// `include_expired`.
    pub async fn list_adjustments(&self, query: &ListAdjustmentsQuery) -> Vec<PriceAdjustment> {
        let scope = OverrideScope::for_tenant(query.tenant_id.as_deref());
        let now = self.clock.now();

        let mut adjustments: Vec<PriceAdjustment> = self
            .merged(&scope)
            .await
            .into_iter()
            .filter(|adj| adj.status != Some(AdjustmentStatus::Archived))
            .filter(|adj| query.include_expired || !adj.has_ended(now))
            .filter(|adj| match &query.branch_id {
                Some(branch) => adj.branch_ids.is_empty() || branch.is_in(&adj.branch_ids),
                None => true,
            })
            .collect();
        engine::sort_adjustments(&mut adjustments);
        adjustments
    }

    /// Creates or updates an adjustment in the tenant's override layer and
    /// returns the stored layer.
    ///
    /// An id naming a base rule copies it into the layer before patching.
    pub async fn upsert_adjustment(
        &self,
        tenant_id: Option<&str>,
        request: UpsertAdjustmentRequest,
        actor: &Actor,
    ) -> Result<Vec<PriceAdjustment>, DomainError> {
        request.validate()?;

        let scope = OverrideScope::for_tenant(tenant_id);
        let now = self.clock.now();
        let requested_id = request.id.clone().filter(|id| !id.trim().is_empty());

        let mut patch = request.into_patch();
        patch.updated_at = Some(Some(now));
        patch.updated_by = Some(actor.id.clone());

        let mut stored = self.overrides.get_adjustments(&scope).await;
        let existing = requested_id
            .as_deref()
            .and_then(|id| stored.iter().position(|adj| adj.id == id));

        match existing {
            Some(index) => {
                let mut updated = stored[index].clone();
                updated.apply_patch(&patch);
                updated.validate_shape()?;
                debug!(id = %updated.id, scope = %scope, "Updating adjustment override");
                stored[index] = updated;
            }
            None => {
                let base = self.base.adjustments().await;
                let seed = requested_id
                    .as_deref()
                    .and_then(|id| base.into_iter().find(|adj| adj.id == id));
                let created = new_override(seed, requested_id, &scope, patch, actor, now);
                created.validate_shape()?;
                info!(id = %created.id, scope = %scope, "Adding adjustment override");
                stored.push(created);
            }
        }

        engine::sort_adjustments(&mut stored);
        self.overrides.put_adjustments(&scope, &stored).await?;
        Ok(stored)
    }

    /// Marks an adjustment archived in the tenant layer.
    pub async fn archive_adjustment(
        &self,
        tenant_id: Option<&str>,
        adjustment_id: &str,
        actor: &Actor,
    ) -> Result<Vec<PriceAdjustment>, DomainError> {
        let scope = OverrideScope::for_tenant(tenant_id);
        let now = self.clock.now();

        let mut stored = self.overrides.get_adjustments(&scope).await;
        let index = match stored.iter().position(|adj| adj.id == adjustment_id) {
            Some(index) => index,
            None => {
                let base = self
                    .base
                    .adjustments()
                    .await
                    .into_iter()
                    .find(|adj| adj.id == adjustment_id)
                    .ok_or_else(|| {
                        DomainError::NotFound(format!("adjustment {}", adjustment_id))
                    })?;
                stored.push(base);
                stored.len() - 1
            }
        };

        let record = &mut stored[index];
        record.status = Some(AdjustmentStatus::Archived);
        record.updated_at = Some(now);
        record.updated_by = actor.id.clone();
        info!(id = %adjustment_id, scope = %scope, "Archiving adjustment");

        engine::sort_adjustments(&mut stored);
        self.overrides.put_adjustments(&scope, &stored).await?;
        Ok(stored)
    }

    /// Prices one product for the query's tenant. Never fails: unreadable
    /// sources degrade to base-only or no adjustments.
    pub async fn evaluate_price(&self, query: &PriceQuery) -> PriceEvaluation {
        let scope = OverrideScope::for_tenant(query.tenant_id.as_deref());
        let now = query.now.unwrap_or_else(|| self.clock.now());

        let adjustments = self.merged(&scope).await;
        let evaluation = engine::evaluate_price(&adjustments, query, now);

        record_price_evaluation(evaluation.available);
        debug!(
            scope = %scope,
            product_id = %query.product_id.canonical(),
            base_price = query.base_price,
            price = evaluation.price,
            applied = evaluation.applied.len(),
            available = evaluation.available,
            "Evaluated price"
        );
        evaluation
    }
}

/// Record entering a tenant layer: a copy of a base rule, or a fresh one.
fn new_override(
    base: Option<PriceAdjustment>,
    requested_id: Option<String>,
    scope: &OverrideScope,
    mut patch: AdjustmentPatch,
    actor: &Actor,
    now: DateTime<Utc>,
) -> PriceAdjustment {
    let tenant = match scope {
        OverrideScope::Tenant(id) => Some(EntityId::from(id.as_str())),
        OverrideScope::Global => None,
    };

    // Copy-on-write keeps the base record's provenance.
    let mut record = match base {
        Some(base) => base,
        None => {
            patch.created_at = Some(Some(now));
            patch.created_by = Some(actor.id.clone());
            let id = requested_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            PriceAdjustment::blank(id)
        }
    };
    patch.tenant_id = Some(tenant);
    record.apply_patch(&patch);
    record
}
