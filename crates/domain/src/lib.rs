//! Domain layer for the POS rules engine.
//!
//! This crate contains:
//! - Domain models (PriceAdjustment, FeatureFlag, evaluation contexts)
//! - Layered merge, eligibility and evaluation logic
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;

pub use error::DomainError;
