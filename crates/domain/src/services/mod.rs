//! Domain services for the pricing and feature flag engine.
//!
//! Everything here is a pure function of merged records, a context and a
//! point in time. I/O and caching live in the persistence crate.

pub mod eligibility;
pub mod flag_evaluation;
pub mod merge;
pub mod pricing;

pub use eligibility::{adjustment_is_eligible, flag_is_eligible, targets_product};
pub use flag_evaluation::{evaluate_flag, rollout_admits, rollout_bucket};
pub use merge::{
    fold_layers, merge_adjustments, resolve_adjustment, resolve_flag, AdjustmentLayer,
    FlagLayers, LayeredRecord, Merged,
};
pub use pricing::{compare_adjustments, eligible_adjustments, evaluate_price, sort_adjustments};
