//! YAML configuration loading and validation.
//!
//! Mirrors the go-playground/validator-driven config of the reference
//! implementation: the file is deserialized strictly (unknown keys are
//! rejected) and then checked against semantic rules the type system
//! can't express (positive counts, at least one broker, unique names).

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::AuthConfig;

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Ingress-facing API/websocket service settings.
    #[serde(rename = "apiService")]
    #[validate(nested)]
    pub api_service: ApiServiceConfig,
    /// Dispatch engine settings.
    #[serde(rename = "telemetryAgent")]
    #[validate(nested)]
    pub telemetry_agent: TelemetryAgentConfig,
}

/// `apiService:` block.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ApiServiceConfig {
    /// `host:port` the ingress adapter listens on.
    #[validate(length(min = 1, message = "apiService.address cannot be empty"))]
    pub address: String,
}

/// `telemetryAgent:` block.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct TelemetryAgentConfig {
    /// Bounded capacity of the ingestion and job queues.
    #[serde(rename = "queueSize")]
    #[validate(range(min = 1, message = "telemetryAgent.queueSize must be positive"))]
    pub queue_size: usize,
    /// Number of worker tasks in the dispatch pool.
    #[serde(rename = "maxWorkers")]
    #[validate(range(min = 1, message = "telemetryAgent.maxWorkers must be positive"))]
    pub max_workers: usize,
    /// Broker registry entries. Must contain at least one; names must be unique.
    #[validate(length(min = 1, message = "telemetryAgent.brokers must contain at least one entry"), nested)]
    pub brokers: Vec<BrokerConfig>,
}

/// A single `brokers:` entry.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    /// Registry-unique name.
    #[validate(length(min = 1, message = "broker name cannot be empty"))]
    pub name: String,
    /// Broker kind, e.g. `"nats"`.
    #[serde(rename = "type")]
    #[validate(length(min = 1, message = "broker type cannot be empty"))]
    pub r#type: String,
    /// Broker connect address.
    #[validate(length(min = 1, message = "broker address cannot be empty"))]
    pub address: String,
    /// Credential configuration for this broker.
    pub auth: AuthConfig,
}

impl Config {
    /// Load and validate configuration from a YAML file at `path`.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::load_from_str(&contents)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_from_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("failed to parse config YAML")?;
        config.validate().context("config failed validation")?;
        config.validate_unique_broker_names()?;
        Ok(config)
    }

    fn validate_unique_broker_names(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for broker in &self.telemetry_agent.brokers {
            if !seen.insert(broker.name.as_str()) {
                anyhow::bail!("duplicate broker name in config: {}", broker.name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_yaml() -> &'static str {
        r#"
apiService:
  address: "0.0.0.0:8080"
telemetryAgent:
  queueSize: 256
  maxWorkers: 8
  brokers:
    - name: b1
      type: nats
      address: "nats://localhost:4222"
      auth:
        method: plain
        user: alice
        password: hunter2
"#
    }

    #[test]
    fn valid_config_parses() {
        let config = Config::load_from_str(valid_yaml()).unwrap();
        assert_eq!(config.telemetry_agent.queue_size, 256);
        assert_eq!(config.telemetry_agent.brokers.len(), 1);
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let yaml = format!("{valid_yaml}\nextraneous: true\n", valid_yaml = valid_yaml());
        assert!(Config::load_from_str(&yaml).is_err());
    }

    #[test]
    fn zero_queue_size_is_rejected() {
        let yaml = valid_yaml().replace("queueSize: 256", "queueSize: 0");
        assert!(Config::load_from_str(&yaml).is_err());
    }

    #[test]
    fn no_brokers_is_rejected() {
        let yaml = r#"
apiService:
  address: "0.0.0.0:8080"
telemetryAgent:
  queueSize: 10
  maxWorkers: 2
  brokers: []
"#;
        assert!(Config::load_from_str(yaml).is_err());
    }

    #[test]
    fn duplicate_broker_names_are_rejected() {
        let yaml = r#"
apiService:
  address: "0.0.0.0:8080"
telemetryAgent:
  queueSize: 10
  maxWorkers: 2
  brokers:
    - name: b1
      type: nats
      address: "nats://localhost:4222"
      auth: { method: token, token: "t1" }
    - name: b1
      type: nats
      address: "nats://localhost:4223"
      auth: { method: token, token: "t2" }
"#;
        let err = Config::load_from_str(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate broker name"));
    }
}
