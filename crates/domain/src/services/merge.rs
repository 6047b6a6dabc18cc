//! Layered record resolution.
//!
//! Records are folded left-to-right over an ordered list of partial layers:
//! the last layer to set a field wins that field. The result remembers which
//! layer set each field, and which layer was applied last.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::models::{
    AdjustmentPatch, FeatureFlag, FlagLayer, FlagOverride, FlagSourceEntry, PriceAdjustment,
};

/// A record that can absorb partial updates.
pub trait LayeredRecord: Clone {
    type Patch;

    /// Applies every field present in `patch`, returning the names of the
    /// fields that were set.
    fn apply_patch(&mut self, patch: &Self::Patch) -> Vec<&'static str>;
}

/// Result of folding layers onto a seed record.
#[derive(Debug, Clone, PartialEq)]
pub struct Merged<T, L> {
    pub record: T,
    /// Field name to the layer that last set it.
    pub field_sources: BTreeMap<&'static str, L>,
    /// Last layer that was applied at all.
    pub last_layer: Option<L>,
}

impl<T, L: Copy> Merged<T, L> {
    pub fn source_of(&self, field: &str) -> Option<L> {
        self.field_sources.get(field).copied()
    }
}

/// Folds `layers` onto `seed` in order of increasing precedence.
pub fn fold_layers<'a, T, L, I>(seed: T, layers: I) -> Merged<T, L>
where
    T: LayeredRecord,
    T::Patch: 'a,
    L: Copy,
    I: IntoIterator<Item = (L, &'a T::Patch)>,
{
    let mut record = seed;
    let mut field_sources = BTreeMap::new();
    let mut last_layer = None;

    for (layer, patch) in layers {
        for field in record.apply_patch(patch) {
            field_sources.insert(field, layer);
        }
        last_layer = Some(layer);
    }

    Merged {
        record,
        field_sources,
        last_layer,
    }
}

macro_rules! set_field {
    ($changed:ident, $target:expr, $source:expr, $name:literal) => {
        if let Some(value) = &$source {
            $target = value.clone();
            $changed.push($name);
        }
    };
}

impl LayeredRecord for PriceAdjustment {
    type Patch = AdjustmentPatch;

    fn apply_patch(&mut self, patch: &AdjustmentPatch) -> Vec<&'static str> {
        let mut changed = Vec::new();
        set_field!(changed, self.name, patch.name, "name");
        set_field!(changed, self.description, patch.description, "description");
        set_field!(changed, self.kind, patch.kind, "type");
        set_field!(changed, self.value, patch.value, "value");
        set_field!(changed, self.fixed_price, patch.fixed_price, "fixedPrice");
        set_field!(changed, self.product_ids, patch.product_ids, "productIds");
        set_field!(changed, self.category_ids, patch.category_ids, "categoryIds");
        set_field!(changed, self.branch_ids, patch.branch_ids, "branchIds");
        set_field!(changed, self.channels, patch.channels, "channels");
        set_field!(changed, self.tenant_id, patch.tenant_id, "tenantId");
        set_field!(changed, self.priority, patch.priority, "priority");
        set_field!(changed, self.stackable, patch.stackable, "stackable");
        set_field!(changed, self.start_at, patch.start_at, "startAt");
        set_field!(changed, self.end_at, patch.end_at, "endAt");
        set_field!(changed, self.status, patch.status, "status");
        set_field!(changed, self.created_at, patch.created_at, "createdAt");
        set_field!(changed, self.created_by, patch.created_by, "createdBy");
        set_field!(changed, self.updated_at, patch.updated_at, "updatedAt");
        set_field!(changed, self.updated_by, patch.updated_by, "updatedBy");
        changed
    }
}

impl LayeredRecord for FeatureFlag {
    type Patch = FlagOverride;

    fn apply_patch(&mut self, patch: &FlagOverride) -> Vec<&'static str> {
        let mut changed = Vec::new();
        set_field!(changed, self.description, patch.description, "description");
        set_field!(changed, self.enabled, patch.enabled, "enabled");
        if let Some(rollout) = &patch.rollout {
            self.rollout = rollout.clone().normalized();
            changed.push("rollout");
        }
        set_field!(changed, self.notes, patch.notes, "notes");
        set_field!(changed, self.tags, patch.tags, "tags");
        if let Some(owner) = &patch.owner {
            self.owner = Some(owner.clone());
            changed.push("owner");
        }
        if let Some(since) = &patch.since {
            self.since = Some(since.clone());
            changed.push("since");
        }
        set_field!(changed, self.environments, patch.environments, "environments");
        if let Some(at) = patch.updated_at {
            self.updated_at = Some(at);
            changed.push("updatedAt");
        }
        if let Some(by) = &patch.updated_by {
            self.updated_by = Some(by.clone());
            changed.push("updatedBy");
        }
        if let Some(name) = &patch.updated_by_name {
            self.updated_by_name = Some(name.clone());
            changed.push("updatedByName");
        }
        changed
    }
}

/// Layer of a merged price adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentLayer {
    Base,
    Tenant,
}

/// Resolves one adjustment from its base record and tenant override.
///
/// Returns `None` when neither layer has the id.
pub fn resolve_adjustment(
    base: Option<&PriceAdjustment>,
    tenant: Option<&PriceAdjustment>,
) -> Option<Merged<PriceAdjustment, AdjustmentLayer>> {
    let id = base.or(tenant).map(|adj| adj.id.clone())?;
    let base_patch = base.cloned().map(AdjustmentPatch::from);
    let tenant_patch = tenant.cloned().map(AdjustmentPatch::from);

    let layers = [
        (AdjustmentLayer::Base, base_patch.as_ref()),
        (AdjustmentLayer::Tenant, tenant_patch.as_ref()),
    ];
    Some(fold_layers(
        PriceAdjustment::blank(id),
        layers
            .into_iter()
            .filter_map(|(layer, patch)| patch.map(|p| (layer, p))),
    ))
}

/// Merges base adjustments with tenant overrides keyed by id.
///
/// Ids present only in the override layer become new records. Output keeps
/// base order first, then override-only records in their stored order.
pub fn merge_adjustments(
    base: &[PriceAdjustment],
    overrides: &[PriceAdjustment],
) -> Vec<PriceAdjustment> {
    let by_id: HashMap<&str, &PriceAdjustment> =
        overrides.iter().map(|adj| (adj.id.as_str(), adj)).collect();
    let base_ids: BTreeSet<&str> = base.iter().map(|adj| adj.id.as_str()).collect();

    let merged_base = base.iter().filter_map(|adj| {
        resolve_adjustment(Some(adj), by_id.get(adj.id.as_str()).copied()).map(|m| m.record)
    });
    let mut seen = BTreeSet::new();
    let created = overrides
        .iter()
        .filter(|adj| !base_ids.contains(adj.id.as_str()))
        .filter(|adj| seen.insert(adj.id.as_str()))
        .filter_map(|adj| resolve_adjustment(None, by_id.get(adj.id.as_str()).copied()))
        .map(|m| m.record);

    merged_base.chain(created).collect()
}

/// Inputs for resolving one flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagLayers<'a> {
    pub default: Option<&'a FlagOverride>,
    pub environment: Option<&'a FlagOverride>,
    pub global: Option<&'a FlagOverride>,
    pub tenant: Option<&'a FlagOverride>,
}

impl<'a> FlagLayers<'a> {
    fn ordered(&self) -> impl Iterator<Item = (FlagLayer, &'a FlagOverride)> {
        [
            (FlagLayer::Default, self.default),
            (FlagLayer::Environment, self.environment),
            (FlagLayer::Global, self.global),
            (FlagLayer::Tenant, self.tenant),
        ]
        .into_iter()
        .filter_map(|(layer, o)| o.map(|o| (layer, o)))
    }

    pub fn is_empty(&self) -> bool {
        self.ordered().next().is_none()
    }
}

/// Resolves a flag across `default < environment < global < tenant`.
///
/// Every present layer is recorded in `sources`; `default_enabled` snapshots
/// the default file's toggle.
pub fn resolve_flag(key: &str, layers: FlagLayers<'_>) -> Merged<FeatureFlag, FlagLayer> {
    let mut merged = fold_layers(FeatureFlag::empty(key), layers.ordered());

    merged.record.default_enabled = layers.default.and_then(|o| o.enabled).unwrap_or(false);
    merged.record.sources = layers
        .ordered()
        .map(|(layer, o)| (layer, FlagSourceEntry::from(o)))
        .collect();
    merged
}
