//! Pool Configuration
//!
//! Sizing policies for the three growable tables and the logging setup.
//! Configuration can be set programmatically or loaded from environment
//! variables.
//!
//! # Environment Variables
//!
//! All environment variables use the `SEGPOOL_` prefix:
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `SEGPOOL_SEGMENT_TABLE_CAPACITY` | Initial segment slots per pool | 40 |
//! | `SEGPOOL_SEGMENT_TABLE_MAX` | Segment slot ceiling per pool | 4294967295 |
//! | `SEGPOOL_FREE_INDEX_CAPACITY` | Initial free-index entries per pool | 40 |
//! | `SEGPOOL_FREE_INDEX_MAX` | Free-index ceiling per pool | 4294967295 |
//! | `SEGPOOL_REGISTRY_CAPACITY` | Initial registry slots | 20 |
//! | `SEGPOOL_REGISTRY_MAX` | Registry ceiling | 4294967295 |
//! | `SEGPOOL_FILL_FACTOR` | Fill factor for every table, in (0, 1] | 0.75 |
//! | `SEGPOOL_EXPAND_FACTOR` | Expand factor for every table (>= 2) | 2 |
//! | `SEGPOOL_LOG_LEVEL` | Log level (off/error/warn/info/debug/trace) | info |
//! | `SEGPOOL_LOG_FORMAT` | Log format (plain/json) | plain |
//!
//! # Example
//!
//! ```rust,ignore
//! use segpool::config::PoolConfig;
//!
//! // Load from environment with defaults
//! let config = PoolConfig::from_env();
//!
//! // Or use the builder pattern
//! let config = PoolConfig::builder()
//!     .segment_table_capacity(128)
//!     .fill_factor(0.5)
//!     .build()?;
//! ```

use std::env;

use thiserror::Error;

use crate::growth::{GrowthPolicy, INDEX_CEILING};
use crate::log::{LogFormat, LogLevel};

/// Logging configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogConfig {
    /// Minimum level.
    /// Default: Info.
    pub level: LogLevel,

    /// Output format.
    /// Default: Plain.
    pub format: LogFormat,
}

/// Complete pool configuration.
///
/// Use `PoolConfig::default()` for the stock sizing, or
/// `PoolConfig::from_env()` to load from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Growth policy for each pool's segment table.
    pub segment_table: GrowthPolicy,

    /// Growth policy for each pool's free index.
    pub free_index: GrowthPolicy,

    /// Growth policy for the pool registry.
    pub registry: GrowthPolicy,

    /// Logging configuration.
    pub log: LogConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            segment_table: GrowthPolicy::SEGMENT_TABLE,
            free_index: GrowthPolicy::FREE_INDEX,
            registry: GrowthPolicy::REGISTRY,
            log: LogConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Create a new builder for PoolConfig.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// Variables that are unset or fail to parse keep their defaults, and so
    /// does any value that would not pass [`validate`](Self::validate).
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(val) = parse_env_usize("SEGPOOL_SEGMENT_TABLE_CAPACITY") {
            if (1..=INDEX_CEILING).contains(&val) {
                config.segment_table.initial_capacity = val;
            }
        }
        if let Some(val) = parse_env_usize("SEGPOOL_SEGMENT_TABLE_MAX") {
            if val >= config.segment_table.initial_capacity && val <= INDEX_CEILING {
                config.segment_table.max_capacity = val;
            }
        }

        if let Some(val) = parse_env_usize("SEGPOOL_FREE_INDEX_CAPACITY") {
            if (1..=INDEX_CEILING).contains(&val) {
                config.free_index.initial_capacity = val;
            }
        }
        if let Some(val) = parse_env_usize("SEGPOOL_FREE_INDEX_MAX") {
            if val >= config.free_index.initial_capacity && val <= INDEX_CEILING {
                config.free_index.max_capacity = val;
            }
        }

        if let Some(val) = parse_env_usize("SEGPOOL_REGISTRY_CAPACITY") {
            if (1..=INDEX_CEILING).contains(&val) {
                config.registry.initial_capacity = val;
            }
        }
        if let Some(val) = parse_env_usize("SEGPOOL_REGISTRY_MAX") {
            if val >= config.registry.initial_capacity && val <= INDEX_CEILING {
                config.registry.max_capacity = val;
            }
        }

        if let Some(val) = parse_env_f64("SEGPOOL_FILL_FACTOR") {
            if val > 0.0 && val <= 1.0 {
                config.for_each_policy(|policy| policy.fill_factor = val);
            }
        }
        if let Some(val) = parse_env_usize("SEGPOOL_EXPAND_FACTOR") {
            if val >= 2 {
                config.for_each_policy(|policy| policy.expand_factor = val);
            }
        }

        if let Some(level) = env::var("SEGPOOL_LOG_LEVEL").ok().and_then(|s| LogLevel::parse(&s)) {
            config.log.level = level;
        }
        if let Some(format) = env::var("SEGPOOL_LOG_FORMAT").ok().and_then(|s| LogFormat::parse(&s)) {
            config.log.format = format;
        }

        config
    }

    fn for_each_policy(&mut self, mut f: impl FnMut(&mut GrowthPolicy)) {
        f(&mut self.segment_table);
        f(&mut self.free_index);
        f(&mut self.registry);
    }

    /// Validate the configuration and return the first error found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_policy("segment_table", &self.segment_table)?;
        validate_policy("free_index", &self.free_index)?;
        validate_policy("registry", &self.registry)?;
        Ok(())
    }
}

fn validate_policy(table: &'static str, policy: &GrowthPolicy) -> Result<(), ConfigError> {
    if policy.initial_capacity == 0 {
        return Err(ConfigError::InvalidValue {
            field: format!("{}.initial_capacity", table),
            message: "must be at least 1".into(),
        });
    }

    if policy.max_capacity > INDEX_CEILING {
        return Err(ConfigError::InvalidValue {
            field: format!("{}.max_capacity", table),
            message: format!("must be at most {}", INDEX_CEILING),
        });
    }

    if policy.max_capacity < policy.initial_capacity {
        return Err(ConfigError::InvalidValue {
            field: format!("{}.max_capacity", table),
            message: "must be at least initial_capacity".into(),
        });
    }

    if !(policy.fill_factor > 0.0 && policy.fill_factor <= 1.0) {
        return Err(ConfigError::InvalidValue {
            field: format!("{}.fill_factor", table),
            message: "must be in (0, 1]".into(),
        });
    }

    if policy.expand_factor < 2 {
        return Err(ConfigError::InvalidValue {
            field: format!("{}.expand_factor", table),
            message: "must be at least 2".into(),
        });
    }

    Ok(())
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Invalid configuration value.
    #[error("invalid configuration for '{field}': {message}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Error message.
        message: String,
    },
}

/// Builder for PoolConfig.
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial segment table capacity.
    pub fn segment_table_capacity(mut self, capacity: usize) -> Self {
        self.config.segment_table.initial_capacity = capacity;
        self
    }

    /// Set the segment table ceiling.
    pub fn segment_table_max(mut self, max: usize) -> Self {
        self.config.segment_table.max_capacity = max;
        self
    }

    /// Set the initial free index capacity.
    pub fn free_index_capacity(mut self, capacity: usize) -> Self {
        self.config.free_index.initial_capacity = capacity;
        self
    }

    /// Set the free index ceiling.
    pub fn free_index_max(mut self, max: usize) -> Self {
        self.config.free_index.max_capacity = max;
        self
    }

    /// Set the initial registry capacity.
    pub fn registry_capacity(mut self, capacity: usize) -> Self {
        self.config.registry.initial_capacity = capacity;
        self
    }

    /// Set the registry ceiling.
    pub fn registry_max(mut self, max: usize) -> Self {
        self.config.registry.max_capacity = max;
        self
    }

    /// Set the fill factor of every table.
    pub fn fill_factor(mut self, fill_factor: f64) -> Self {
        self.config.for_each_policy(|policy| policy.fill_factor = fill_factor);
        self
    }

    /// Set the expand factor of every table.
    pub fn expand_factor(mut self, expand_factor: usize) -> Self {
        self.config.for_each_policy(|policy| policy.expand_factor = expand_factor);
        self
    }

    /// Replace the segment table policy wholesale.
    pub fn segment_table(mut self, policy: GrowthPolicy) -> Self {
        self.config.segment_table = policy;
        self
    }

    /// Replace the free index policy wholesale.
    pub fn free_index(mut self, policy: GrowthPolicy) -> Self {
        self.config.free_index = policy;
        self
    }

    /// Replace the registry policy wholesale.
    pub fn registry(mut self, policy: GrowthPolicy) -> Self {
        self.config.registry = policy;
        self
    }

    /// Set the log level.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log.level = level;
        self
    }

    /// Set the log format.
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.config.log.format = format;
        self
    }

    /// Build the configuration.
    ///
    /// This validates the configuration and returns an error if invalid.
    pub fn build(self) -> Result<PoolConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Build the configuration without validation.
    ///
    /// Use this only if you're certain the configuration is valid.
    pub fn build_unchecked(self) -> PoolConfig {
        self.config
    }
}

/// Parse an environment variable as usize.
fn parse_env_usize(name: &str) -> Option<usize> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Parse an environment variable as f64.
fn parse_env_f64(name: &str) -> Option<f64> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.segment_table.initial_capacity, 40);
        assert_eq!(config.free_index.initial_capacity, 40);
        assert_eq!(config.registry.initial_capacity, 20);
        assert_eq!(config.registry.fill_factor, 0.75);
        assert_eq!(config.log.level, LogLevel::Info);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = PoolConfig::builder()
            .segment_table_capacity(8)
            .free_index_capacity(16)
            .registry_capacity(2)
            .fill_factor(0.5)
            .expand_factor(3)
            .log_level(LogLevel::Debug)
            .log_format(LogFormat::Json)
            .build()
            .unwrap();

        assert_eq!(config.segment_table.initial_capacity, 8);
        assert_eq!(config.free_index.initial_capacity, 16);
        assert_eq!(config.registry.initial_capacity, 2);
        assert_eq!(config.segment_table.fill_factor, 0.5);
        assert_eq!(config.registry.expand_factor, 3);
        assert_eq!(config.log.level, LogLevel::Debug);
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn test_builder_rejects_zero_capacity() {
        let err = PoolConfig::builder().free_index_capacity(0).build().unwrap_err();
        assert!(err.to_string().contains("free_index.initial_capacity"));
    }

    #[test]
    fn test_builder_rejects_ceiling_below_initial() {
        let result = PoolConfig::builder()
            .segment_table_capacity(64)
            .segment_table_max(32)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_bad_factors() {
        assert!(PoolConfig::builder().fill_factor(0.0).build().is_err());
        assert!(PoolConfig::builder().fill_factor(1.5).build().is_err());
        assert!(PoolConfig::builder().fill_factor(f64::NAN).build().is_err());
        assert!(PoolConfig::builder().expand_factor(1).build().is_err());
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_builder_rejects_ceiling_above_u32_indices() {
        let err = PoolConfig::builder()
            .segment_table_max(INDEX_CEILING + 1)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("segment_table.max_capacity"));

        assert!(PoolConfig::builder().registry_max(INDEX_CEILING).build().is_ok());
    }

    #[test]
    fn test_build_unchecked_skips_validation() {
        let config = PoolConfig::builder().registry_capacity(0).build_unchecked();
        assert_eq!(config.registry.initial_capacity, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env_with_no_vars() {
        let config = PoolConfig::from_env();
        assert!(config.validate().is_ok());
    }
}
