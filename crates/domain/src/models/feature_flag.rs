//! Feature flag domain models.
//!
//! A flag is assembled from up to four layers (default file, environment,
//! global override, tenant override). Each layer contributes a
//! [`FlagOverride`]; the resolved [`FeatureFlag`] remembers what every layer
//! contributed in `sources`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use super::entity_id::EntityId;
use super::price_adjustment::double_option;
use crate::error::DomainError;

/// A configuration layer, ordered by increasing precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagLayer {
    Default,
    Environment,
    Global,
    Tenant,
}

impl std::fmt::Display for FlagLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlagLayer::Default => write!(f, "default"),
            FlagLayer::Environment => write!(f, "environment"),
            FlagLayer::Global => write!(f, "global"),
            FlagLayer::Tenant => write!(f, "tenant"),
        }
    }
}

/// The highest-precedence layer that touched a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveSource {
    Default,
    Environment,
    Global,
    Tenant,
    Unknown,
}

impl From<Option<FlagLayer>> for ActiveSource {
    fn from(layer: Option<FlagLayer>) -> Self {
        match layer {
            Some(FlagLayer::Default) => ActiveSource::Default,
            Some(FlagLayer::Environment) => ActiveSource::Environment,
            Some(FlagLayer::Global) => ActiveSource::Global,
            Some(FlagLayer::Tenant) => ActiveSource::Tenant,
            None => ActiveSource::Unknown,
        }
    }
}

/// Rollout strategy. Unrecognised names survive a round trip so stored
/// data is never rewritten, and evaluate to the flag's raw toggle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RolloutStrategy {
    #[default]
    All,
    Percentage,
    Roles,
    Branches,
    Other(String),
}

impl From<String> for RolloutStrategy {
    fn from(value: String) -> Self {
        match value.as_str() {
            "all" | "" => RolloutStrategy::All,
            "percentage" => RolloutStrategy::Percentage,
            "roles" => RolloutStrategy::Roles,
            "branches" => RolloutStrategy::Branches,
            _ => RolloutStrategy::Other(value),
        }
    }
}

impl From<RolloutStrategy> for String {
    fn from(value: RolloutStrategy) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for RolloutStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RolloutStrategy::All => write!(f, "all"),
            RolloutStrategy::Percentage => write!(f, "percentage"),
            RolloutStrategy::Roles => write!(f, "roles"),
            RolloutStrategy::Branches => write!(f, "branches"),
            RolloutStrategy::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Who a flag is exposed to once it is enabled.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rollout {
    #[serde(default)]
    pub strategy: RolloutStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<Vec<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
}

impl Rollout {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn percentage(percentage: f64) -> Self {
        Self {
            strategy: RolloutStrategy::Percentage,
            percentage: Some(percentage),
            ..Default::default()
        }
    }

    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            strategy: RolloutStrategy::Roles,
            roles: Some(roles.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn branches<I, B>(branches: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<EntityId>,
    {
        Self {
            strategy: RolloutStrategy::Branches,
            branches: Some(branches.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Lenient normalisation for stored data.
    ///
    /// Drops fields the strategy does not use and clamps the percentage into
    /// 0..=100 (missing or non-finite becomes 0).
    pub fn normalized(self) -> Self {
        let percentage = match self.strategy {
            RolloutStrategy::Percentage => Some(shared::validation::clamp_rollout_percentage(
                self.percentage.unwrap_or(0.0),
            )),
            _ => None,
        };
        let roles = match self.strategy {
            RolloutStrategy::Roles => self.roles,
            _ => None,
        };
        let branches = match self.strategy {
            RolloutStrategy::Branches => self.branches,
            _ => None,
        };

        Self {
            strategy: self.strategy,
            percentage,
            roles,
            branches,
            segment: self.segment,
        }
    }

    /// Strict check for administrative writes: the strategy must be known,
    /// its own field must be present, and other strategies' fields must not.
    pub fn validate_fields(&self) -> Result<(), DomainError> {
        let has_percentage = self.percentage.is_some();
        let has_roles = self.roles.is_some();
        let has_branches = self.branches.is_some();

        let forbid = |present: bool, field: &str| -> Result<(), DomainError> {
            if present {
                Err(DomainError::Validation(format!(
                    "rollout.{}: not allowed for strategy '{}'",
                    field, self.strategy
                )))
            } else {
                Ok(())
            }
        };

        match &self.strategy {
            RolloutStrategy::All => {
                forbid(has_percentage, "percentage")?;
                forbid(has_roles, "roles")?;
                forbid(has_branches, "branches")
            }
            RolloutStrategy::Percentage => {
                let pct = self.percentage.ok_or_else(|| {
                    DomainError::Validation(
                        "rollout.percentage: required for percentage strategy".into(),
                    )
                })?;
                shared::validation::validate_rollout_percentage(pct).map_err(|_| {
                    DomainError::Validation("rollout.percentage: must be between 0 and 100".into())
                })?;
                forbid(has_roles, "roles")?;
                forbid(has_branches, "branches")
            }
            RolloutStrategy::Roles => {
                if !has_roles {
                    return Err(DomainError::Validation(
                        "rollout.roles: required for roles strategy".into(),
                    ));
                }
                forbid(has_percentage, "percentage")?;
                forbid(has_branches, "branches")
            }
            RolloutStrategy::Branches => {
                if !has_branches {
                    return Err(DomainError::Validation(
                        "rollout.branches: required for branches strategy".into(),
                    ));
                }
                forbid(has_percentage, "percentage")?;
                forbid(has_roles, "roles")
            }
            RolloutStrategy::Other(name) => Err(DomainError::Validation(format!(
                "rollout.strategy: unknown strategy '{}'",
                name
            ))),
        }
    }
}

/// What one layer contributes to a flag. Absent fields leave the lower
/// layers' values in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout: Option<Rollout>,
    /// `Some(None)` clears notes set by a lower layer.
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environments: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by_name: Option<String>,
}

impl FlagOverride {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Default::default()
        }
    }
}

/// A flag entry as written in the defaults file or the environment layer:
/// either a bare boolean or an override object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawFlagEntry {
    Toggle(bool),
    Override(FlagOverride),
}

impl From<RawFlagEntry> for FlagOverride {
    fn from(raw: RawFlagEntry) -> Self {
        match raw {
            RawFlagEntry::Toggle(enabled) => FlagOverride::enabled(enabled),
            RawFlagEntry::Override(o) => o,
        }
    }
}

/// Record of what a single layer set, kept for precedence inspection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagSourceEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollout: Option<Rollout>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by_name: Option<String>,
}

impl From<&FlagOverride> for FlagSourceEntry {
    fn from(o: &FlagOverride) -> Self {
        Self {
            enabled: o.enabled,
            rollout: o.rollout.clone().map(Rollout::normalized),
            notes: o.notes.clone().flatten(),
            updated_at: o.updated_at,
            updated_by: o.updated_by.clone(),
            updated_by_name: o.updated_by_name.clone(),
        }
    }
}

/// A fully resolved feature flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlag {
    pub key: String,
    pub description: String,
    pub enabled: bool,
    pub rollout: Rollout,
    pub tags: Vec<String>,
    pub owner: Option<String>,
    pub since: Option<String>,
    pub environments: Vec<String>,
    pub notes: Option<String>,
    /// `enabled` as shipped in the defaults file.
    pub default_enabled: bool,
    pub sources: BTreeMap<FlagLayer, FlagSourceEntry>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
    pub updated_by_name: Option<String>,
}

impl FeatureFlag {
    /// A disabled flag with no metadata.
    pub fn empty(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: String::new(),
            enabled: false,
            rollout: Rollout::all(),
            tags: Vec::new(),
            owner: None,
            since: None,
            environments: Vec::new(),
            notes: None,
            default_enabled: false,
            sources: BTreeMap::new(),
            updated_at: None,
            updated_by: None,
            updated_by_name: None,
        }
    }

    /// Highest-precedence layer present in `sources`.
    pub fn active_source(&self) -> ActiveSource {
        self.sources.keys().next_back().copied().into()
    }
}

/// Caller-facing view of a flag with its evaluation for a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagView {
    pub key: String,
    pub description: String,
    /// Raw toggle after layering ("is this flag generally on").
    pub enabled: bool,
    /// Decision for the supplied context.
    pub evaluation: bool,
    pub rollout: Rollout,
    pub tags: Vec<String>,
    pub owner: Option<String>,
    pub since: Option<String>,
    pub notes: Option<String>,
    pub default_enabled: bool,
    pub environments: Vec<String>,
    pub active_source: ActiveSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<BTreeMap<FlagLayer, FlagSourceEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by_name: Option<String>,
}

impl FlagView {
    pub fn new(flag: FeatureFlag, evaluation: bool, include_metadata: bool) -> Self {
        let active_source = flag.active_source();
        let (sources, updated_at, updated_by, updated_by_name) = if include_metadata {
            (
                Some(flag.sources),
                flag.updated_at,
                flag.updated_by,
                flag.updated_by_name,
            )
        } else {
            (None, None, None, None)
        };

        Self {
            key: flag.key,
            description: flag.description,
            enabled: flag.enabled,
            evaluation,
            rollout: flag.rollout,
            tags: flag.tags,
            owner: flag.owner,
            since: flag.since,
            notes: flag.notes,
            default_enabled: flag.default_enabled,
            environments: flag.environments,
            active_source,
            sources,
            updated_at,
            updated_by,
            updated_by_name,
        }
    }
}

/// Target scope of a flag mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagScope {
    Global,
    #[default]
    Tenant,
}

/// Administrative update of a flag in one scope.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFlagRequest {
    pub enabled: bool,
    /// Defaults to the `all` strategy when omitted.
    #[serde(default)]
    pub rollout: Option<Rollout>,
    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    #[serde(default)]
    pub notes: Option<String>,
}

impl UpdateFlagRequest {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            rollout: None,
            notes: None,
        }
    }

    pub fn with_rollout(mut self, rollout: Rollout) -> Self {
        self.rollout = Some(rollout);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Field checks plus rollout strategy rules.
    pub fn check(&self) -> Result<(), DomainError> {
        self.validate()?;
        if let Some(rollout) = &self.rollout {
            rollout.validate_fields()?;
        }
        Ok(())
    }
}

lazy_static::lazy_static! {
    pub static ref FLAG_KEY_REGEX: regex::Regex =
        regex::Regex::new(r"^[a-z0-9][a-z0-9_.-]{0,127}$").unwrap();
}

/// Validates a flag key: lowercase alphanumerics plus `_`, `.` and `-`.
pub fn validate_flag_key(key: &str) -> Result<(), DomainError> {
    if FLAG_KEY_REGEX.is_match(key) {
        Ok(())
    } else {
        Err(DomainError::Validation(format!(
            "key: '{}' is not a valid flag key",
            key
        )))
    }
}
