//! Caller context extractor.
//!
//! Identity and location arrive as headers set by the upstream gateway after
//! authentication.

use std::convert::Infallible;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use domain::models::{Actor, EntityId, EvaluationContext};

use crate::error::ApiError;

pub const TENANT_ID_HEADER: &str = "x-tenant-id";
pub const BRANCH_ID_HEADER: &str = "x-branch-id";
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Who is calling and from where.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    pub tenant_id: Option<String>,
    pub branch_id: Option<EntityId>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub role: Option<String>,
    pub session_id: Option<String>,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            tenant_id: header(headers, TENANT_ID_HEADER),
            // Numeric branch ids stay numeric so they compare either way.
            branch_id: header(headers, BRANCH_ID_HEADER).map(|raw| match raw.parse::<i64>() {
                Ok(n) => EntityId::from(n),
                Err(_) => EntityId::from(raw),
            }),
            user_id: header(headers, USER_ID_HEADER),
            user_name: header(headers, USER_NAME_HEADER),
            role: header(headers, USER_ROLE_HEADER),
            session_id: header(headers, SESSION_ID_HEADER),
        }
    }

    /// Flag evaluation context for this caller.
    pub fn evaluation_context(&self) -> EvaluationContext {
        EvaluationContext {
            tenant_id: self.tenant_id.clone(),
            branch_id: self.branch_id.clone(),
            channel: None,
            role: self.role.clone(),
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            now: None,
        }
    }

    pub fn actor(&self) -> Actor {
        Actor {
            id: self.user_id.clone(),
            name: self.user_name.clone(),
        }
    }

    pub fn has_role(&self, roles: &[&str]) -> bool {
        self.role
            .as_deref()
            .is_some_and(|role| roles.iter().any(|r| r.eq_ignore_ascii_case(role)))
    }

    /// Forbidden unless the caller holds one of `roles`.
    pub fn require_role(&self, roles: &[&str]) -> Result<(), ApiError> {
        if self.has_role(roles) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "Requires one of roles: {}",
                roles.join(", ")
            )))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestContext::from_headers(&parts.headers))
    }
}
