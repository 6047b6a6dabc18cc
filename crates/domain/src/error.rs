//! Domain error types.

use thiserror::Error;

/// Errors surfaced to administrative callers.
///
/// Evaluation paths never produce these; they degrade to base behaviour
/// instead. Only mutations fail visibly.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Tenant ID is required for tenant-scoped changes")]
    ScopeRequired,

    #[error("Runtime updates for feature flags are disabled")]
    RuntimeUpdatesDisabled,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<validator::ValidationErrors> for DomainError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => format!("{}: {}", field, msg),
                    None => format!("{}: {}", field, e.code),
                })
            })
            .collect();
        messages.sort();
        DomainError::Validation(messages.join("; "))
    }
}
