//! Eligibility predicates.
//!
//! Pure functions over a record and a context; nothing here is cached, so
//! each (record, context) pair is decided on its own.

use chrono::{DateTime, Utc};

use crate::models::{Channel, EntityId, FeatureFlag, PriceAdjustment};

/// Empty `product_ids` targets every product and empty `category_ids` every
/// category. A category-targeted rule never applies to an uncategorised
/// query.
pub fn targets_product(
    adjustment: &PriceAdjustment,
    product_id: &EntityId,
    category_id: Option<&EntityId>,
) -> bool {
    let product_matches =
        adjustment.product_ids.is_empty() || product_id.is_in(&adjustment.product_ids);
    let category_matches = adjustment.category_ids.is_empty()
        || category_id.is_some_and(|category| category.is_in(&adjustment.category_ids));
    product_matches && category_matches
}

/// Whether `adjustment` may apply on `channel` at `branch_id` at time `now`.
///
/// A branch-targeted rule never applies when the caller has no branch.
pub fn adjustment_is_eligible(
    adjustment: &PriceAdjustment,
    channel: Channel,
    branch_id: Option<&EntityId>,
    now: DateTime<Utc>,
) -> bool {
    if !adjustment.channels.contains(&channel) {
        return false;
    }

    if !adjustment.branch_ids.is_empty() {
        match branch_id {
            Some(branch) if branch.is_in(&adjustment.branch_ids) => {}
            _ => return false,
        }
    }

    if matches!(adjustment.start_at, Some(start) if start > now) {
        return false;
    }
    if adjustment.has_ended(now) {
        return false;
    }

    !matches!(adjustment.status, Some(status) if status.is_terminal())
}

/// A disabled flag is never eligible, whatever its rollout says.
pub fn flag_is_eligible(flag: &FeatureFlag) -> bool {
    flag.enabled
}
