//! Engine services wired from configuration.

pub mod feature_flags;
pub mod pricing;

pub use feature_flags::FeatureFlagService;
pub use pricing::{ListAdjustmentsQuery, PricingService};
