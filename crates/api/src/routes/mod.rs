//! HTTP route handlers.

pub mod feature_flags;
pub mod health;
pub mod pricing;
