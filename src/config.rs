//! YAML configuration for the bridge binary

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use wifitak_kismet::{FieldMap, KismetConfig};
use wifitak_transport::SenderConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub kismet: KismetSection,
    pub pipeline: PipelineSection,
    pub senders: Vec<SenderConfig>,
}

/// Feed connection plus the ingestion knobs layered on top of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KismetSection {
    #[serde(flatten)]
    pub connection: KismetConfig,
    /// Seconds between reconnection attempts
    pub retry_secs: u64,
    /// Seconds each event stays fresh
    pub stale_secs: i64,
    /// Field table overrides; unspecified rows keep their defaults
    pub fields: FieldMap,
}

impl Default for KismetSection {
    fn default() -> Self {
        Self {
            connection: KismetConfig::default(),
            retry_secs: 3,
            stale_secs: 3600,
            fields: FieldMap::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Inbound event queue depth; a full queue backpressures ingestion
    pub queue_depth: usize,
    /// Per-sender relay queue depth
    pub relay_depth: usize,
    /// Seconds a sender is held back after a failed delivery
    pub retry_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            queue_depth: 256,
            relay_depth: 64,
            retry_secs: 3,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.senders.is_empty() {
            bail!("config lists no senders, events would have nowhere to go");
        }
        if self.pipeline.queue_depth == 0 {
            bail!("pipeline.queue_depth must be at least 1");
        }
        if self.pipeline.relay_depth == 0 {
            bail!("pipeline.relay_depth must be at least 1");
        }
        if self.pipeline.retry_secs == 0 {
            bail!("pipeline.retry_secs must be at least 1");
        }
        if self.kismet.retry_secs == 0 {
            bail!("kismet.retry_secs must be at least 1");
        }
        if self.kismet.stale_secs <= 0 {
            bail!("kismet.stale_secs must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let yaml = r#"
kismet:
  username: admin
  password: hunter2
senders:
  - kind: multicast
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.kismet.connection.host, "127.0.0.1");
        assert_eq!(config.kismet.connection.port, 2501);
        assert_eq!(config.kismet.connection.username, "admin");
        assert_eq!(config.kismet.retry_secs, 3);
        assert_eq!(config.kismet.stale_secs, 3600);
        assert_eq!(config.pipeline.queue_depth, 256);
        assert_eq!(config.pipeline.retry_secs, 3);
        assert_eq!(config.senders.len(), 1);
    }

    #[test]
    fn field_table_rows_can_be_overridden() {
        let yaml = r#"
kismet:
  fields:
    geopoint:
      key: kismet.historic.location.geopoint
      alias: geopoint
senders:
  - kind: stdout
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.kismet.fields.geopoint.key,
            "kismet.historic.location.geopoint"
        );
        // untouched rows keep their defaults
        assert_eq!(config.kismet.fields.mac.key, "kismet.device.base.macaddr");
    }

    #[test]
    fn empty_sender_list_is_rejected() {
        let config: Config = serde_yaml::from_str("kismet: {}").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_queue_depth_is_rejected() {
        let yaml = r#"
pipeline:
  queue_depth: 0
senders:
  - kind: stdout
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }
}
