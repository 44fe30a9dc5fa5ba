//! Application-layer messages exchanged with pub/sub integrations.
//!
//! `ApplicationUp` carries one outbound event for an end device; the event
//! variant determines the [`MessageCategory`] (and thus the topic) it is
//! published on. Downlink commands arrive as [`ApplicationDownlinks`] (push)
//! or [`DownlinkQueueRequest`] (replace).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::MessageCategory;

/// Identifiers of an end device within an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndDeviceIds {
    pub device_id: String,
    pub application_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_eui: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_eui: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_addr: Option<String>,
}

impl EndDeviceIds {
    pub fn new(application_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            application_id: application_id.into(),
            dev_eui: None,
            join_eui: None,
            dev_addr: None,
        }
    }
}

// ─── Outbound ───

/// An outbound application event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationUp {
    pub end_device_ids: EndDeviceIds,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub correlation_ids: Vec<String>,
    pub received_at: DateTime<Utc>,
    /// Serialized as a single key named after the category.
    #[serde(flatten)]
    pub event: UpEvent,
}

impl ApplicationUp {
    pub fn new(end_device_ids: EndDeviceIds, event: UpEvent) -> Self {
        Self {
            end_device_ids,
            correlation_ids: Vec::new(),
            received_at: Utc::now(),
            event,
        }
    }

    /// Category this event is published on.
    pub fn category(&self) -> MessageCategory {
        self.event.category()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpEvent {
    UplinkMessage(UplinkMessage),
    JoinAccept(JoinAccept),
    DownlinkAck(ApplicationDownlink),
    DownlinkNack(ApplicationDownlink),
    DownlinkSent(ApplicationDownlink),
    DownlinkFailed(DownlinkFailed),
    DownlinkQueued(ApplicationDownlink),
    LocationSolved(LocationSolved),
}

impl UpEvent {
    pub fn category(&self) -> MessageCategory {
        match self {
            UpEvent::UplinkMessage(_) => MessageCategory::UplinkMessage,
            UpEvent::JoinAccept(_) => MessageCategory::JoinAccept,
            UpEvent::DownlinkAck(_) => MessageCategory::DownlinkAck,
            UpEvent::DownlinkNack(_) => MessageCategory::DownlinkNack,
            UpEvent::DownlinkSent(_) => MessageCategory::DownlinkSent,
            UpEvent::DownlinkFailed(_) => MessageCategory::DownlinkFailed,
            UpEvent::DownlinkQueued(_) => MessageCategory::DownlinkQueued,
            UpEvent::LocationSolved(_) => MessageCategory::LocationSolved,
        }
    }
}

/// Uplink data frame received from an end device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UplinkMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key_id: Option<String>,
    #[serde(default)]
    pub f_port: u32,
    #[serde(default)]
    pub f_cnt: u32,
    #[serde(
        default,
        with = "base64_bytes",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub frm_payload: Vec<u8>,
    /// Payload decoded by an application payload formatter, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoded_payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAccept {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownlinkFailed {
    pub downlink: ApplicationDownlink,
    pub error: ErrorDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSolved {
    /// Location solver that produced the fix.
    pub service: String,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

// ─── Downlinks ───

/// Transmission priority of a downlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxPriority {
    Lowest,
    Low,
    BelowNormal,
    #[default]
    Normal,
    AboveNormal,
    High,
    Highest,
}

/// A downlink command for one end device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDownlink {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key_id: Option<String>,
    #[serde(default)]
    pub f_port: u32,
    #[serde(default)]
    pub f_cnt: u32,
    #[serde(
        default,
        with = "base64_bytes",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub frm_payload: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoded_payload: Option<serde_json::Value>,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub priority: TxPriority,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub correlation_ids: Vec<String>,
}

impl ApplicationDownlink {
    /// Unconfirmed downlink with a raw payload on `f_port`.
    pub fn new(f_port: u32, frm_payload: impl Into<Vec<u8>>) -> Self {
        Self {
            session_key_id: None,
            f_port,
            f_cnt: 0,
            frm_payload: frm_payload.into(),
            decoded_payload: None,
            confirmed: false,
            priority: TxPriority::default(),
            correlation_ids: Vec::new(),
        }
    }
}

/// Batch of downlinks to push onto a device queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDownlinks {
    #[serde(default)]
    pub downlinks: Vec<ApplicationDownlink>,
}

/// Request to replace the downlink queue of one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownlinkQueueRequest {
    pub end_device_ids: EndDeviceIds,
    #[serde(default)]
    pub downlinks: Vec<ApplicationDownlink>,
}

/// Serde adapter for raw bytes as standard base64 strings.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
