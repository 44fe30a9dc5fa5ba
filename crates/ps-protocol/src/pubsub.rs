//! Application pub/sub descriptors.
//!
//! A [`PubSubDescriptor`] selects a backend through its [`ProviderSettings`]
//! variant and declares, per [`MessageCategory`], the topic relative to
//! `base_topic` that category is routed to. Descriptors are loaded from
//! configuration and never mutated by the connection core.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::category::MessageCategory;

/// Identifies one pub/sub integration of an application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PubSubIds {
    pub application_id: String,
    pub pub_sub_id: String,
}

impl fmt::Display for PubSubIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.application_id, self.pub_sub_id)
    }
}

/// Full integration descriptor: backend, wire format and topic wiring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PubSubDescriptor {
    #[serde(flatten)]
    pub ids: PubSubIds,
    /// Backend selection and backend-specific settings.
    pub provider: ProviderSettings,
    /// Wire format name, resolved against the formatter registry.
    #[serde(default = "default_format")]
    pub format: String,
    /// Topic every category topic is appended to.
    #[serde(default)]
    pub base_topic: String,
    #[serde(default)]
    pub topics: CategoryTopics,
}

fn default_format() -> String {
    "json".to_string()
}

impl PubSubDescriptor {
    /// Tag of the backend this descriptor selects.
    pub fn provider_tag(&self) -> ProviderTag {
        self.provider.tag()
    }
}

// ─── Provider selection ───

/// Backend technology tag, the key of the provider registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTag {
    Mqtt,
    Nats,
}

impl fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderTag::Mqtt => f.write_str("mqtt"),
            ProviderTag::Nats => f.write_str("nats"),
        }
    }
}

/// Backend-specific settings; the variant doubles as the backend tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderSettings {
    Mqtt(MqttSettings),
    Nats(NatsSettings),
}

impl ProviderSettings {
    pub fn tag(&self) -> ProviderTag {
        match self {
            ProviderSettings::Mqtt(_) => ProviderTag::Mqtt,
            ProviderSettings::Nats(_) => ProviderTag::Nats,
        }
    }

    /// QoS for outbound topics. Backends without QoS levels use the default.
    pub fn publish_qos(&self) -> Qos {
        match self {
            ProviderSettings::Mqtt(mqtt) => mqtt.publish_qos,
            ProviderSettings::Nats(_) => Qos::default(),
        }
    }

    /// QoS for inbound subscriptions.
    pub fn subscribe_qos(&self) -> Qos {
        match self {
            ProviderSettings::Mqtt(mqtt) => mqtt.subscribe_qos,
            ProviderSettings::Nats(_) => Qos::default(),
        }
    }
}

/// Delivery guarantee requested from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Qos {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

/// MQTT broker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttSettings {
    /// Broker URL, e.g. `tcp://broker:1883` or `mqtts://broker:8883`.
    pub server_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Force TLS even when the URL scheme is plaintext.
    #[serde(default)]
    pub use_tls: bool,
    /// Path to the CA certificate (PEM).
    #[serde(default)]
    pub tls_ca: Option<String>,
    /// Path to the client certificate (PEM).
    #[serde(default)]
    pub tls_client_cert: Option<String>,
    /// Path to the client private key (PEM).
    #[serde(default)]
    pub tls_client_key: Option<String>,
    #[serde(default)]
    pub publish_qos: Qos,
    #[serde(default)]
    pub subscribe_qos: Qos,
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
}

fn default_keepalive() -> u16 {
    30
}

/// NATS server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NatsSettings {
    pub server_url: String,
}

// ─── Topic wiring ───

/// Relative topic per category; `None` means the category is not wired.
///
/// One slot per category, so category identity never depends on position
/// in a list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryTopics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uplink_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_accept: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downlink_ack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downlink_nack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downlink_sent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downlink_failed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downlink_queued: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_solved: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downlink_push: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downlink_replace: Option<String>,
}

impl CategoryTopics {
    fn slot(&self, category: MessageCategory) -> &Option<String> {
        match category {
            MessageCategory::UplinkMessage => &self.uplink_message,
            MessageCategory::JoinAccept => &self.join_accept,
            MessageCategory::DownlinkAck => &self.downlink_ack,
            MessageCategory::DownlinkNack => &self.downlink_nack,
            MessageCategory::DownlinkSent => &self.downlink_sent,
            MessageCategory::DownlinkFailed => &self.downlink_failed,
            MessageCategory::DownlinkQueued => &self.downlink_queued,
            MessageCategory::LocationSolved => &self.location_solved,
            MessageCategory::DownlinkPush => &self.downlink_push,
            MessageCategory::DownlinkReplace => &self.downlink_replace,
        }
    }

    fn slot_mut(&mut self, category: MessageCategory) -> &mut Option<String> {
        match category {
            MessageCategory::UplinkMessage => &mut self.uplink_message,
            MessageCategory::JoinAccept => &mut self.join_accept,
            MessageCategory::DownlinkAck => &mut self.downlink_ack,
            MessageCategory::DownlinkNack => &mut self.downlink_nack,
            MessageCategory::DownlinkSent => &mut self.downlink_sent,
            MessageCategory::DownlinkFailed => &mut self.downlink_failed,
            MessageCategory::DownlinkQueued => &mut self.downlink_queued,
            MessageCategory::LocationSolved => &mut self.location_solved,
            MessageCategory::DownlinkPush => &mut self.downlink_push,
            MessageCategory::DownlinkReplace => &mut self.downlink_replace,
        }
    }

    /// Relative topic for `category`, if wired.
    pub fn get(&self, category: MessageCategory) -> Option<&str> {
        self.slot(category).as_deref()
    }

    pub fn set(&mut self, category: MessageCategory, topic: Option<String>) {
        *self.slot_mut(category) = topic;
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, category: MessageCategory, topic: impl Into<String>) -> Self {
        self.set(category, Some(topic.into()));
        self
    }

    /// Wired outbound categories with their relative topics, in open order.
    pub fn configured_outbound(&self) -> impl Iterator<Item = (MessageCategory, &str)> {
        MessageCategory::OUTBOUND
            .into_iter()
            .filter_map(|c| self.get(c).map(|t| (c, t)))
    }

    /// Wired inbound categories with their relative topics, in open order.
    pub fn configured_inbound(&self) -> impl Iterator<Item = (MessageCategory, &str)> {
        MessageCategory::INBOUND
            .into_iter()
            .filter_map(|c| self.get(c).map(|t| (c, t)))
    }

    /// Number of wired categories.
    pub fn len(&self) -> usize {
        MessageCategory::ALL
            .into_iter()
            .filter(|c| self.get(*c).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
