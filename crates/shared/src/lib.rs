//! Shared utilities and common types for the POS rules engine.
//!
//! This crate provides common functionality used across all other crates:
//! - Clock abstraction so caches and evaluators can be driven by tests
//! - Rollout hashing (stable percentage buckets)
//! - Monetary rounding helpers
//! - Common validation logic

pub mod clock;
pub mod crypto;
pub mod money;
pub mod validation;
