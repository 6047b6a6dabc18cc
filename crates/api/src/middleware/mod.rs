//! HTTP middleware components.

pub mod features;
pub mod logging;
pub mod metrics;

pub use features::{feature_gate, require_feature, FeatureGate};
pub use metrics::{init_metrics, metrics_handler, metrics_middleware};
