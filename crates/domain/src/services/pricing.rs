//! Price evaluation over a merged adjustment set.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use shared::money;

use super::eligibility::{adjustment_is_eligible, targets_product};
use crate::models::{AdjustmentKind, PriceAdjustment, PriceEvaluation, PriceQuery};

/// Evaluation order: ascending priority, then most recent `start_at` first
/// (unbounded start counts as oldest), then id.
pub fn compare_adjustments(a: &PriceAdjustment, b: &PriceAdjustment) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| b.start_at.cmp(&a.start_at))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_adjustments(adjustments: &mut [PriceAdjustment]) {
    adjustments.sort_by(compare_adjustments);
}

/// Adjustments that target the product and pass eligibility, in evaluation
/// order.
pub fn eligible_adjustments<'a>(
    adjustments: &'a [PriceAdjustment],
    query: &PriceQuery,
    now: DateTime<Utc>,
) -> Vec<&'a PriceAdjustment> {
    let mut eligible: Vec<&PriceAdjustment> = adjustments
        .iter()
        .filter(|adj| targets_product(adj, &query.product_id, query.category_id.as_ref()))
        .filter(|adj| adjustment_is_eligible(adj, query.channel, query.branch_id.as_ref(), now))
        .collect();
    eligible.sort_by(|a, b| compare_adjustments(a, b));
    eligible
}

/// Price after one adjustment. Availability rules are handled by the caller.
fn transform(adjustment: &PriceAdjustment, price: f64) -> f64 {
    match adjustment.kind {
        AdjustmentKind::Fixed => adjustment.fixed_price.map_or(price, money::round_cents),
        AdjustmentKind::Percentage => adjustment
            .value
            .map_or(price, |pct| money::apply_percentage(price, pct)),
        AdjustmentKind::Availability => price,
    }
}

/// Prices `query.base_price` against `adjustments` at time `now`.
///
/// An eligible availability rule wins outright. Otherwise rules apply in
/// order, each on the previous result, stopping after the first
/// non-stackable one.
pub fn evaluate_price(
    adjustments: &[PriceAdjustment],
    query: &PriceQuery,
    now: DateTime<Utc>,
) -> PriceEvaluation {
    let eligible = eligible_adjustments(adjustments, query, now);
    if eligible.is_empty() {
        return PriceEvaluation::unchanged(query.base_price);
    }

    if let Some(blocker) = eligible
        .iter()
        .find(|adj| adj.kind == AdjustmentKind::Availability)
    {
        return PriceEvaluation {
            price: 0.0,
            applied: vec![blocker.summary()],
            available: false,
        };
    }

    let mut price = query.base_price;
    let mut applied = Vec::new();
    for adjustment in eligible {
        price = transform(adjustment, price);
        applied.push(adjustment.summary());
        if !adjustment.stackable {
            break;
        }
    }

    PriceEvaluation {
        price: money::round_cents(price),
        applied,
        available: true,
    }
}
