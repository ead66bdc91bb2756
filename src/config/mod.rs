//! # Resilience Configuration
//!
//! Configuration for the consumer resilience layer. Every section has
//! defaults, so an empty file (or no file at all) yields a working setup.
//!
//! ## Sources
//!
//! Layered by [`ConfigManager`], later sources winning:
//!
//! 1. Built-in defaults
//! 2. `config/resilience.toml`
//! 3. `config/resilience.<environment>.toml`
//! 4. `RESILIENCE__<SECTION>__<KEY>` environment variables
//!
//! ## Usage
//!
//! ```rust,no_run
//! use resilient_consumer::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let max_retries = manager.config().consumer.max_retries;
//! let ttl = manager.config().dedup.ttl();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `resilience.toml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Cross-delivery retry bound and dead-letter routing
    pub consumer: ConsumerConfig,

    /// Deduplication window
    pub dedup: DedupConfig,

    /// Backoff between inline retries
    pub backoff: BackoffConfig,

    /// Inline retry bounds
    pub inline_retry: InlineRetryConfig,
}

/// What a worker does when dead-letter publishing itself fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingFailurePolicy {
    /// Stop the partition worker with the error
    #[default]
    Halt,
    /// Log and count the failure, leave the message unacknowledged, keep consuming
    AlertAndSkip,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Deliveries with `retryCount >= max_retries` are dead-lettered
    pub max_retries: u32,
    /// Tag written into dead-letter envelopes
    pub service_name: String,
    pub dead_letter_topic: String,
    pub routing_failure_policy: RoutingFailurePolicy,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRIES,
            service_name: defaults::SERVICE_NAME.to_string(),
            dead_letter_topic: defaults::DEAD_LETTER_TOPIC.to_string(),
            routing_failure_policy: RoutingFailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DedupConfig {
    pub ttl_ms: u64,
    pub max_size: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_ms: defaults::DEDUP_TTL_MS,
            max_size: defaults::DEDUP_MAX_SIZE,
        }
    }
}

impl DedupConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: defaults::BACKOFF_INITIAL_DELAY_MS,
            max_delay_ms: defaults::BACKOFF_MAX_DELAY_MS,
            multiplier: defaults::BACKOFF_MULTIPLIER,
        }
    }
}

impl BackoffConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InlineRetryConfig {
    /// Retry executor bound around the business call (0 = call once)
    pub business_retries: u32,
    /// Retry executor bound around each downstream publish
    pub publish_retries: u32,
}

impl Default for InlineRetryConfig {
    fn default() -> Self {
        Self {
            business_retries: defaults::INLINE_BUSINESS_RETRIES,
            publish_retries: defaults::INLINE_PUBLISH_RETRIES,
        }
    }
}

impl ResilienceConfig {
    /// Defaults overlaid with `RESILIENCE__*` environment variables only
    pub fn from_env() -> ConfigResult<Self> {
        let config: ResilienceConfig = loader::environment_source_builder()
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the resilience layer cannot operate with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.consumer.service_name.trim().is_empty() {
            return Err(ConfigurationError::invalid(
                "consumer.service_name",
                "must not be empty",
            ));
        }

        if self.consumer.dead_letter_topic.trim().is_empty() {
            return Err(ConfigurationError::invalid(
                "consumer.dead_letter_topic",
                "must not be empty",
            ));
        }

        if self.dedup.max_size == 0 {
            return Err(ConfigurationError::invalid(
                "dedup.max_size",
                "must be greater than 0",
            ));
        }

        if self.dedup.ttl_ms == 0 {
            return Err(ConfigurationError::invalid(
                "dedup.ttl_ms",
                "must be greater than 0",
            ));
        }

        if self.backoff.initial_delay_ms == 0 {
            return Err(ConfigurationError::invalid(
                "backoff.initial_delay_ms",
                "must be greater than 0",
            ));
        }

        if self.backoff.max_delay_ms < self.backoff.initial_delay_ms {
            return Err(ConfigurationError::invalid(
                "backoff.max_delay_ms",
                format!(
                    "{} is below initial_delay_ms {}",
                    self.backoff.max_delay_ms, self.backoff.initial_delay_ms
                ),
            ));
        }

        if !self.backoff.multiplier.is_finite() || self.backoff.multiplier < 1.0 {
            return Err(ConfigurationError::invalid(
                "backoff.multiplier",
                format!("{} must be a finite value >= 1.0", self.backoff.multiplier),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ResilienceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.consumer.max_retries, 3);
        assert_eq!(config.dedup.ttl(), Duration::from_secs(3600));
        assert_eq!(config.dedup.max_size, 10_000);
        assert_eq!(config.inline_retry.publish_retries, 3);
        assert_eq!(config.consumer.routing_failure_policy, RoutingFailurePolicy::Halt);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ResilienceConfig::default();
        config.dedup.max_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::Invalid { ref field, .. }) if field == "dedup.max_size"
        ));

        let mut config = ResilienceConfig::default();
        config.backoff.multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = ResilienceConfig::default();
        config.backoff.multiplier = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = ResilienceConfig::default();
        config.backoff.max_delay_ms = 10;
        assert!(config.validate().is_err());

        let mut config = ResilienceConfig::default();
        config.consumer.dead_letter_topic = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: ResilienceConfig =
            serde_json::from_str(r#"{"consumer": {"max_retries": 5}}"#).unwrap();
        assert_eq!(config.consumer.max_retries, 5);
        assert_eq!(config.consumer.service_name, "resilient-consumer");
        assert_eq!(config.dedup, DedupConfig::default());
    }

    #[test]
    fn test_routing_policy_names() {
        let policy: RoutingFailurePolicy = serde_json::from_str(r#""alert_and_skip""#).unwrap();
        assert_eq!(policy, RoutingFailurePolicy::AlertAndSkip);
    }
}
