//! Domain models for the pricing and feature flag engine.

pub mod actor;
pub mod context;
pub mod entity_id;
pub mod feature_flag;
pub mod price_adjustment;

pub use actor::Actor;
pub use context::{Channel, EvaluationContext, PriceQuery};
pub use entity_id::EntityId;
pub use feature_flag::{
    validate_flag_key, ActiveSource, FeatureFlag, FlagLayer, FlagOverride, FlagScope,
    FlagSourceEntry, FlagView, RawFlagEntry, Rollout, RolloutStrategy, UpdateFlagRequest,
};
pub use price_adjustment::{
    infer_status, AdjustmentKind, AdjustmentPatch, AdjustmentStatus, AdjustmentSummary,
    PriceAdjustment, PriceEvaluation, UpsertAdjustmentRequest, DEFAULT_PRIORITY,
};
