//! Dynamic price adjustment domain models.
//!
//! Adjustments are stored as camelCase JSON (both in the seed file and in the
//! override store), so field names here follow that wire shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use super::context::Channel;
use super::entity_id::EntityId;
use crate::error::DomainError;

/// Default evaluation priority; lower values are evaluated first.
pub const DEFAULT_PRIORITY: i32 = 100;

/// How an adjustment transforms a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentKind {
    /// Subtracts `value` percent of the current price.
    #[default]
    Percentage,
    /// Replaces the price with `fixedPrice`.
    Fixed,
    /// Marks the product as not purchasable.
    Availability,
}

impl std::fmt::Display for AdjustmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdjustmentKind::Percentage => write!(f, "percentage"),
            AdjustmentKind::Fixed => write!(f, "fixed"),
            AdjustmentKind::Availability => write!(f, "availability"),
        }
    }
}

/// Lifecycle status of an adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentStatus {
    Scheduled,
    Active,
    Disabled,
    Archived,
    Expired,
}

impl AdjustmentStatus {
    /// Disabled and archived rules stay off until explicitly reactivated.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AdjustmentStatus::Disabled | AdjustmentStatus::Archived)
    }
}

impl std::fmt::Display for AdjustmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdjustmentStatus::Scheduled => write!(f, "scheduled"),
            AdjustmentStatus::Active => write!(f, "active"),
            AdjustmentStatus::Disabled => write!(f, "disabled"),
            AdjustmentStatus::Archived => write!(f, "archived"),
            AdjustmentStatus::Expired => write!(f, "expired"),
        }
    }
}

fn default_channels() -> Vec<Channel> {
    vec![Channel::Pos]
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

/// Distinguishes "field absent" from "field explicitly null".
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A price adjustment rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceAdjustment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", alias = "kind", default)]
    pub kind: AdjustmentKind,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub fixed_price: Option<f64>,
    #[serde(default)]
    pub product_ids: Vec<EntityId>,
    #[serde(default)]
    pub category_ids: Vec<EntityId>,
    #[serde(default)]
    pub branch_ids: Vec<EntityId>,
    #[serde(default = "default_channels")]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub tenant_id: Option<EntityId>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub stackable: bool,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    /// Explicit status; when absent it is inferred from the time window.
    #[serde(default)]
    pub status: Option<AdjustmentStatus>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_by: Option<String>,
}

impl PriceAdjustment {
    /// An empty rule with defaults applied, used as the fold seed for
    /// records that exist only in an override layer.
    pub fn blank(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
            kind: AdjustmentKind::Percentage,
            value: None,
            fixed_price: None,
            product_ids: Vec::new(),
            category_ids: Vec::new(),
            branch_ids: Vec::new(),
            channels: default_channels(),
            tenant_id: None,
            priority: DEFAULT_PRIORITY,
            stackable: false,
            start_at: None,
            end_at: None,
            status: None,
            created_at: None,
            created_by: None,
            updated_at: None,
            updated_by: None,
        }
    }

    /// Status derived from the window when none was stored.
    pub fn effective_status(&self, now: DateTime<Utc>) -> AdjustmentStatus {
        if let Some(status) = self.status {
            return status;
        }
        infer_status(self.start_at, self.end_at, now)
    }

    /// True once `end_at` lies in the past, whatever the stored status says.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        matches!(self.end_at, Some(end) if end < now)
    }

    /// Checks the per-kind field invariant.
    ///
    /// Percentage rules need `value` in -100..=100, fixed rules need a
    /// non-negative `fixedPrice`, availability rules carry neither.
    pub fn validate_shape(&self) -> Result<(), DomainError> {
        if self.id.trim().is_empty() {
            return Err(DomainError::Validation("id: must not be empty".into()));
        }
        if self.channels.is_empty() {
            return Err(DomainError::Validation(
                "channels: at least one channel is required".into(),
            ));
        }
        if let (Some(start), Some(end)) = (self.start_at, self.end_at) {
            if end < start {
                return Err(DomainError::Validation(
                    "endAt: must not be before startAt".into(),
                ));
            }
        }

        match self.kind {
            AdjustmentKind::Percentage => {
                let value = self.value.ok_or_else(|| {
                    DomainError::Validation("value: required for percentage adjustments".into())
                })?;
                shared::validation::validate_adjustment_percentage(value)
                    .map_err(|_| DomainError::Validation("value: must be between -100 and 100".into()))?;
                if self.fixed_price.is_some() {
                    return Err(DomainError::Validation(
                        "fixedPrice: not allowed for percentage adjustments".into(),
                    ));
                }
            }
            AdjustmentKind::Fixed => {
                let price = self.fixed_price.ok_or_else(|| {
                    DomainError::Validation("fixedPrice: required for fixed adjustments".into())
                })?;
                shared::validation::validate_price(price)
                    .map_err(|_| DomainError::Validation("fixedPrice: must be non-negative".into()))?;
                if self.value.is_some() {
                    return Err(DomainError::Validation(
                        "value: not allowed for fixed adjustments".into(),
                    ));
                }
            }
            AdjustmentKind::Availability => {
                if self.value.is_some() || self.fixed_price.is_some() {
                    return Err(DomainError::Validation(
                        "availability adjustments carry neither value nor fixedPrice".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Compact form carried in evaluation results.
    pub fn summary(&self) -> AdjustmentSummary {
        AdjustmentSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            value: self.value,
            fixed_price: self.fixed_price,
            priority: self.priority,
            stackable: self.stackable,
        }
    }
}

/// Infers a status from an active window.
pub fn infer_status(
    start_at: Option<DateTime<Utc>>,
    end_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> AdjustmentStatus {
    if matches!(end_at, Some(end) if end < now) {
        return AdjustmentStatus::Expired;
    }
    if matches!(start_at, Some(start) if start > now) {
        return AdjustmentStatus::Scheduled;
    }
    AdjustmentStatus::Active
}

/// Partial update of an adjustment. `None` leaves a field untouched; for
/// nullable fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub kind: Option<AdjustmentKind>,
    #[serde(default, deserialize_with = "double_option")]
    pub value: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub fixed_price: Option<Option<f64>>,
    pub product_ids: Option<Vec<EntityId>>,
    pub category_ids: Option<Vec<EntityId>>,
    pub branch_ids: Option<Vec<EntityId>>,
    pub channels: Option<Vec<Channel>>,
    #[serde(default, deserialize_with = "double_option")]
    pub tenant_id: Option<Option<EntityId>>,
    pub priority: Option<i32>,
    pub stackable: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub start_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub end_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub status: Option<Option<AdjustmentStatus>>,
    #[serde(default, deserialize_with = "double_option")]
    pub created_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub created_by: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub updated_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub updated_by: Option<Option<String>>,
}

impl From<PriceAdjustment> for AdjustmentPatch {
    /// A full record sets every field.
    fn from(adj: PriceAdjustment) -> Self {
        Self {
            name: Some(adj.name),
            description: Some(adj.description),
            kind: Some(adj.kind),
            value: Some(adj.value),
            fixed_price: Some(adj.fixed_price),
            product_ids: Some(adj.product_ids),
            category_ids: Some(adj.category_ids),
            branch_ids: Some(adj.branch_ids),
            channels: Some(adj.channels),
            tenant_id: Some(adj.tenant_id),
            priority: Some(adj.priority),
            stackable: Some(adj.stackable),
            start_at: Some(adj.start_at),
            end_at: Some(adj.end_at),
            status: Some(adj.status),
            created_at: Some(adj.created_at),
            created_by: Some(adj.created_by),
            updated_at: Some(adj.updated_at),
            updated_by: Some(adj.updated_by),
        }
    }
}

/// Administrative create/update payload for an adjustment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpsertAdjustmentRequest {
    /// Existing id to update; a fresh id is generated when absent.
    #[validate(length(min = 1, max = 128, message = "Id must be 1-128 characters"))]
    pub id: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
    #[serde(rename = "type", alias = "kind")]
    pub kind: Option<AdjustmentKind>,
    #[validate(custom(function = "shared::validation::validate_adjustment_percentage"))]
    pub value: Option<f64>,
    #[validate(custom(function = "shared::validation::validate_price"))]
    pub fixed_price: Option<f64>,
    pub product_ids: Option<Vec<EntityId>>,
    pub category_ids: Option<Vec<EntityId>>,
    pub branch_ids: Option<Vec<EntityId>>,
    #[validate(length(min = 1, message = "At least one channel is required"))]
    pub channels: Option<Vec<Channel>>,
    #[validate(range(min = -10000, max = 10000, message = "Priority must be between -10000 and 10000"))]
    pub priority: Option<i32>,
    pub stackable: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub start_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub end_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub status: Option<Option<AdjustmentStatus>>,
}

impl UpsertAdjustmentRequest {
    /// Converts the payload into a patch; provenance is stamped by the caller.
    ///
    /// Changing `type` clears whichever of `value`/`fixedPrice` the new kind
    /// does not use, unless the payload sets it explicitly.
    pub fn into_patch(self) -> AdjustmentPatch {
        let (clear_value, clear_fixed) = match self.kind {
            Some(AdjustmentKind::Percentage) => (false, true),
            Some(AdjustmentKind::Fixed) => (true, false),
            Some(AdjustmentKind::Availability) => (true, true),
            None => (false, false),
        };
        let value = match self.value {
            Some(v) => Some(Some(v)),
            None if clear_value => Some(None),
            None => None,
        };
        let fixed_price = match self.fixed_price {
            Some(p) => Some(Some(p)),
            None if clear_fixed => Some(None),
            None => None,
        };

        AdjustmentPatch {
            name: self.name,
            description: self.description,
            kind: self.kind,
            value,
            fixed_price,
            product_ids: self.product_ids,
            category_ids: self.category_ids,
            branch_ids: self.branch_ids,
            channels: self.channels,
            tenant_id: None,
            priority: self.priority,
            stackable: self.stackable,
            start_at: self.start_at,
            end_at: self.end_at,
            status: self.status,
            created_at: None,
            created_by: None,
            updated_at: None,
            updated_by: None,
        }
    }
}

/// Adjustment as reported in an evaluation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AdjustmentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_price: Option<f64>,
    pub priority: i32,
    pub stackable: bool,
}

/// Result of pricing one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceEvaluation {
    pub price: f64,
    pub applied: Vec<AdjustmentSummary>,
    pub available: bool,
}

impl PriceEvaluation {
    /// Base price with nothing applied.
    pub fn unchanged(base_price: f64) -> Self {
        Self {
            price: base_price,
            applied: Vec::new(),
            available: true,
        }
    }
}
