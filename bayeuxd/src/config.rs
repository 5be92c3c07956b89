//! Top-level configuration.
//!
//! [`Config`] maps the whole TOML file: the optional `[backbone]` section and
//! the `[extensions.*]` tables. Missing extension tables fall back to their
//! defaults, so an empty file is a valid configuration with both extensions
//! enabled and no backbone.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cluster::config::{BackboneConfig, BackboneConnectionConfig};
use crate::error::ConfigError;
use crate::extension::{
    AckEviction, AckExtension, ExtensionPipeline, OverflowLogLevel, TimesyncExtension,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub backbone: Option<BackboneConfig>,
    #[serde(default)]
    pub extensions: ExtensionsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtensionsConfig {
    #[serde(default)]
    pub ack: AckConfig,
    #[serde(default)]
    pub timesync: TimesyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_window_size")]
    pub max_window_size: usize,
    #[serde(default)]
    pub eviction: AckEviction,
    #[serde(default)]
    pub overflow_log_level: OverflowLogLevel,
}

impl Default for AckConfig {
    fn default() -> Self {
        AckConfig {
            enabled: default_enabled(),
            max_window_size: default_max_window_size(),
            eviction: AckEviction::default(),
            overflow_log_level: OverflowLogLevel::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimesyncConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for TimesyncConfig {
    fn default() -> Self {
        TimesyncConfig {
            enabled: default_enabled(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_window_size() -> usize {
    100
}

impl Config {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Builds the server-wide extension pipeline: ack first, then timesync.
    pub fn build_pipeline(&self) -> ExtensionPipeline {
        let mut pipeline = ExtensionPipeline::new();

        let ack = &self.extensions.ack;
        if ack.enabled {
            pipeline.register(Arc::new(
                AckExtension::new(ack.max_window_size)
                    .with_eviction(ack.eviction)
                    .with_overflow_log_level(ack.overflow_log_level),
            ));
        }
        if self.extensions.timesync.enabled {
            pipeline.register(Arc::new(TimesyncExtension::new()));
        }

        pipeline
    }

    /// The resolved backbone settings, if a `[backbone]` section is present.
    pub fn backbone_connection(&self) -> Result<Option<BackboneConnectionConfig>, ConfigError> {
        self.backbone
            .clone()
            .map(BackboneConnectionConfig::try_from)
            .transpose()
    }
}
