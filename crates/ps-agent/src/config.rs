//! Agent configuration, loadable from TOML.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use ps_protocol::PubSubDescriptor;
use ps_provider::ConnectOptions;

use crate::error::{AgentError, AgentResult};

/// Top-level configuration for the pub/sub agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Bound on establishing each backend session.
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Bound on opening each topic handle.
    #[serde(default = "default_timeout_secs")]
    pub topic_timeout_secs: u64,
    /// Bound on disconnecting each integration at shutdown.
    #[serde(default = "default_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    /// One entry per application pub/sub.
    #[serde(default)]
    pub integrations: Vec<PubSubDescriptor>,
}

fn default_timeout_secs() -> u64 {
    8
}

impl AgentConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            topic_timeout: Duration::from_secs(self.topic_timeout_secs),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Reject duplicate integration ids and unknown formats before any
    /// backend is contacted.
    pub fn validate(&self) -> AgentResult<()> {
        let mut seen = HashSet::new();
        for descriptor in &self.integrations {
            if !seen.insert(&descriptor.ids) {
                return Err(AgentError::Config(format!(
                    "duplicate integration {}",
                    descriptor.ids
                )));
            }
            ps_formatters::lookup(&descriptor.format)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_protocol::{MessageCategory, ProviderTag};

    #[test]
    fn deserialize_minimal_config() {
        let config: AgentConfig = toml::from_str("").unwrap();
        assert_eq!(config.connect_timeout_secs, 8); // default
        assert_eq!(config.topic_timeout_secs, 8); // default
        assert_eq!(config.shutdown_timeout_secs, 8); // default
        assert!(config.integrations.is_empty());
        assert_eq!(config.connect_options(), ConnectOptions::default());
    }

    #[test]
    fn deserialize_full_config() {
        let toml = r#"
connect_timeout_secs = 3
shutdown_timeout_secs = 2

[[integrations]]
application_id = "app-1"
pub_sub_id = "broker-a"
base_topic = "v3/app-1"
provider = { type = "mqtt", server_url = "tcp://localhost:1883", client_id = "bridge" }

[integrations.topics]
uplink_message = "up"
downlink_push = "down/push"

[[integrations]]
application_id = "app-2"
pub_sub_id = "nats"
provider = { type = "nats", server_url = "nats://localhost:4222" }
"#;
        let config: AgentConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.connect_timeout_secs, 3);
        assert_eq!(config.topic_timeout_secs, 8);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(2));
        assert_eq!(config.integrations.len(), 2);

        let first = &config.integrations[0];
        assert_eq!(first.provider_tag(), ProviderTag::Mqtt);
        assert_eq!(first.topics.get(MessageCategory::DownlinkPush), Some("down/push"));
        assert_eq!(config.integrations[1].provider_tag(), ProviderTag::Nats);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_duplicates_and_unknown_formats() {
        let toml = r#"
[[integrations]]
application_id = "app-1"
pub_sub_id = "a"
provider = { type = "nats", server_url = "nats://localhost" }

[[integrations]]
application_id = "app-1"
pub_sub_id = "a"
provider = { type = "nats", server_url = "nats://localhost" }
"#;
        let config: AgentConfig = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(AgentError::Config(_))));

        let mut config = config;
        config.integrations.truncate(1);
        config.integrations[0].format = "protobuf".into();
        assert!(matches!(config.validate(), Err(AgentError::Format(_))));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(AgentConfig::from_file("/nonexistent/agent.toml").is_err());
    }
}
