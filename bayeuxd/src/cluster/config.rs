//! Settings for the broker backbone.
//!
//! Operators write a `[backbone]` table naming this node, the topic and the
//! broker list; that is [`BackboneConfig`]. Before a backbone is built it is
//! checked and resolved into a [`BackboneConnectionConfig`]: the topic gains
//! its `bayeux-` prefix, the broker list is split, and the timeouts
//! become durations. The consumer and producer client ids are derived here
//! too.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Prefix applied to every backbone topic.
pub const TOPIC_PREFIX: &str = "bayeux-";

/// Raw backbone configuration as deserialized from TOML.
///
/// The `servers` field is a comma-separated string of broker addresses
/// (e.g. `"kafka1:9092, kafka2:9092"`), parsed into a `Vec<String>`
/// when converting to [`BackboneConnectionConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackboneConfig {
    pub node_name: String,
    pub topic: String,
    pub servers: String,
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    #[serde(default = "default_max_poll_records")]
    pub max_poll_records: usize,
    #[serde(default)]
    pub startup_grace_period_secs: u64,
}

fn default_concurrency_limit() -> usize {
    1
}

fn default_poll_timeout_ms() -> u64 {
    3000
}

fn default_max_poll_records() -> usize {
    500
}

/// Resolved backbone configuration ready for use by
/// [`BrokerBackbone`](super::broker_backbone::BrokerBackbone).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackboneConnectionConfig {
    pub node_name: String,
    /// Full topic name, prefix included.
    pub topic: String,
    pub servers: Vec<String>,
    pub concurrency_limit: usize,
    pub poll_timeout: Duration,
    pub max_poll_records: usize,
    pub startup_grace_period: Duration,
}

impl BackboneConnectionConfig {
    pub fn producer_client_id(&self) -> String {
        format!("producer-{}-{}", self.topic, self.node_name)
    }

    pub fn consumer_client_id(&self, index: usize) -> String {
        format!("consumer-{}-{}-{}", index, self.topic, self.node_name)
    }
}

impl TryFrom<BackboneConfig> for BackboneConnectionConfig {
    type Error = ConfigError;

    fn try_from(config: BackboneConfig) -> Result<Self, Self::Error> {
        let servers: Vec<String> = config
            .servers
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if servers.is_empty() {
            return Err(invalid("backbone config must name at least one server"));
        }
        let node_name = config.node_name.trim().to_string();
        if node_name.is_empty() {
            return Err(invalid("backbone config must set node_name"));
        }
        let topic = config.topic.trim();
        if topic.is_empty() {
            return Err(invalid("backbone config must set topic"));
        }
        if config.concurrency_limit == 0 {
            return Err(invalid("backbone concurrency_limit must be at least 1"));
        }
        if config.max_poll_records == 0 {
            return Err(invalid("backbone max_poll_records must be at least 1"));
        }

        Ok(BackboneConnectionConfig {
            node_name,
            topic: format!("{TOPIC_PREFIX}{topic}"),
            servers,
            concurrency_limit: config.concurrency_limit,
            poll_timeout: Duration::from_millis(config.poll_timeout_ms),
            max_poll_records: config.max_poll_records,
            startup_grace_period: Duration::from_secs(config.startup_grace_period_secs),
        })
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::Invalid(reason.to_string())
}
