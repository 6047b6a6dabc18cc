//! Evaluation contexts supplied by callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::entity_id::EntityId;

/// Sales channel a price is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Pos,
    Customer,
    Delivery,
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pos" => Ok(Channel::Pos),
            "customer" => Ok(Channel::Customer),
            "delivery" => Ok(Channel::Delivery),
            _ => Err(format!("Unknown channel: {}", s)),
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Pos => write!(f, "pos"),
            Channel::Customer => write!(f, "customer"),
            Channel::Delivery => write!(f, "delivery"),
        }
    }
}

/// Who and where an evaluation is performed for.
///
/// Every field is optional; strategies only look at the identifiers they
/// need. `now` defaults to the engine clock when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationContext {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub branch_id: Option<EntityId>,
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_branch(mut self, branch_id: impl Into<EntityId>) -> Self {
        self.branch_id = Some(branch_id.into());
        self
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Identity used for percentage bucketing.
    ///
    /// First non-empty of user, session, tenant; `"global"` otherwise.
    pub fn rollout_identity(&self) -> &str {
        [&self.user_id, &self.session_id, &self.tenant_id]
            .into_iter()
            .flatten()
            .map(|s| s.as_str())
            .find(|s| !s.is_empty())
            .unwrap_or("global")
    }
}

/// A request to price one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuery {
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub product_id: EntityId,
    #[serde(default)]
    pub category_id: Option<EntityId>,
    pub base_price: f64,
    #[serde(default)]
    pub branch_id: Option<EntityId>,
    #[serde(default)]
    pub channel: Channel,
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
}

impl PriceQuery {
    pub fn new(product_id: impl Into<EntityId>, base_price: f64) -> Self {
        Self {
            tenant_id: None,
            product_id: product_id.into(),
            category_id: None,
            base_price,
            branch_id: None,
            channel: Channel::Pos,
            now: None,
        }
    }

    pub fn for_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn at_branch(mut self, branch_id: impl Into<EntityId>) -> Self {
        self.branch_id = Some(branch_id.into());
        self
    }

    pub fn in_category(mut self, category_id: impl Into<EntityId>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn on_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }
}
