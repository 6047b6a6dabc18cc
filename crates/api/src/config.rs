use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub redis: RedisConfig,
    pub pricing: PricingConfig,
    pub feature_flags: FeatureFlagsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json` or `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// When false, overrides live in process memory only.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Dynamic pricing settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_pricing_namespace")]
    pub namespace: String,

    /// TTL of the in-process base adjustment snapshot.
    #[serde(default = "default_pricing_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Expiry of stored tenant overrides; 0 keeps them until overwritten.
    #[serde(default = "default_pricing_override_ttl")]
    pub override_ttl_secs: u64,

    #[serde(default = "default_pricing_base_path")]
    pub base_config_path: String,

    /// Flag guarding the pricing routes; empty leaves them ungated.
    #[serde(default = "default_pricing_feature_flag")]
    pub feature_flag: String,
}

/// Feature flag settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureFlagsConfig {
    #[serde(default = "default_flags_namespace")]
    pub namespace: String,

    /// TTL of the base flag snapshot and of the in-process override cache.
    #[serde(default = "default_flags_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_flags_defaults_path")]
    pub defaults_path: String,

    /// JSON object forming the `environment` layer, e.g.
    /// `{"new_menu": true, "beta_checkout": {"enabled": false}}`.
    #[serde(default)]
    pub environment_overrides: Option<String>,

    #[serde(default = "default_true")]
    pub allow_runtime_updates: bool,
}

impl PricingConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn gate_flag(&self) -> Option<&str> {
        let key = self.feature_flag.trim();
        (!key.is_empty()).then_some(key)
    }

    /// `None` when stored overrides should not expire.
    pub fn override_ttl(&self) -> Option<Duration> {
        (self.override_ttl_secs > 0).then(|| Duration::from_secs(self.override_ttl_secs))
    }
}

impl FeatureFlagsConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_true() -> bool {
    true
}
fn default_pricing_namespace() -> String {
    "dynamic-pricing".to_string()
}
fn default_pricing_cache_ttl() -> u64 {
    30
}
fn default_pricing_override_ttl() -> u64 {
    30
}
fn default_pricing_base_path() -> String {
    "config/dynamic_pricing.json".to_string()
}
fn default_pricing_feature_flag() -> String {
    "platform.dynamic_pricing".to_string()
}
fn default_flags_namespace() -> String {
    "feature-flags".to_string()
}
fn default_flags_cache_ttl() -> u64 {
    15
}
fn default_flags_defaults_path() -> String {
    "config/feature_flags.json".to_string()
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with POS__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("POS").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Builds the config from embedded defaults so tests do not depend on
    /// the working directory.
    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30

            [logging]
            level = "info"
            format = "json"

            [redis]
            url = "redis://localhost:6379"
            enabled = false

            [pricing]
            namespace = "dynamic-pricing"
            cache_ttl_secs = 30
            override_ttl_secs = 30
            base_config_path = "config/dynamic_pricing.json"

            [feature_flags]
            namespace = "feature-flags"
            cache_ttl_secs = 15
            defaults_path = "config/feature_flags.json"
            allow_runtime_updates = true
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        // Skip validation in tests to allow partial configs
        Ok(cfg)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.pricing.namespace.trim().is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "POS__PRICING__NAMESPACE must not be empty".to_string(),
            ));
        }

        if self.feature_flags.namespace.trim().is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "POS__FEATURE_FLAGS__NAMESPACE must not be empty".to_string(),
            ));
        }

        if self.redis.enabled
            && !(self.redis.url.starts_with("redis://") || self.redis.url.starts_with("rediss://"))
        {
            return Err(ConfigValidationError::InvalidValue(format!(
                "Redis URL must start with redis:// or rediss://, got '{}'",
                self.redis.url
            )));
        }

        if let Some(json) = &self.feature_flags.environment_overrides {
            if !json.trim().is_empty() && serde_json::from_str::<serde_json::Value>(json).is_err() {
                return Err(ConfigValidationError::InvalidValue(
                    "feature_flags.environment_overrides is not valid JSON".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
