//! Message categories routed to their own topic.
//!
//! Eight outbound categories carry application events towards the backend,
//! two inbound categories carry downlink commands back in. The declaration
//! order is the order connections open (and roll back) their handles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A semantic event/command kind with its own topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageCategory {
    // ─── Outbound ───
    UplinkMessage,
    JoinAccept,
    DownlinkAck,
    DownlinkNack,
    DownlinkSent,
    DownlinkFailed,
    DownlinkQueued,
    LocationSolved,
    // ─── Inbound ───
    DownlinkPush,
    DownlinkReplace,
}

impl MessageCategory {
    /// Outbound categories in open order.
    pub const OUTBOUND: [MessageCategory; 8] = [
        MessageCategory::UplinkMessage,
        MessageCategory::JoinAccept,
        MessageCategory::DownlinkAck,
        MessageCategory::DownlinkNack,
        MessageCategory::DownlinkSent,
        MessageCategory::DownlinkFailed,
        MessageCategory::DownlinkQueued,
        MessageCategory::LocationSolved,
    ];

    /// Inbound categories in open order (after all outbound ones).
    pub const INBOUND: [MessageCategory; 2] =
        [MessageCategory::DownlinkPush, MessageCategory::DownlinkReplace];

    /// Every category, outbound first.
    pub const ALL: [MessageCategory; 10] = [
        MessageCategory::UplinkMessage,
        MessageCategory::JoinAccept,
        MessageCategory::DownlinkAck,
        MessageCategory::DownlinkNack,
        MessageCategory::DownlinkSent,
        MessageCategory::DownlinkFailed,
        MessageCategory::DownlinkQueued,
        MessageCategory::LocationSolved,
        MessageCategory::DownlinkPush,
        MessageCategory::DownlinkReplace,
    ];

    pub fn is_outbound(self) -> bool {
        !self.is_inbound()
    }

    pub fn is_inbound(self) -> bool {
        matches!(
            self,
            MessageCategory::DownlinkPush | MessageCategory::DownlinkReplace
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageCategory::UplinkMessage => "uplink_message",
            MessageCategory::JoinAccept => "join_accept",
            MessageCategory::DownlinkAck => "downlink_ack",
            MessageCategory::DownlinkNack => "downlink_nack",
            MessageCategory::DownlinkSent => "downlink_sent",
            MessageCategory::DownlinkFailed => "downlink_failed",
            MessageCategory::DownlinkQueued => "downlink_queued",
            MessageCategory::LocationSolved => "location_solved",
            MessageCategory::DownlinkPush => "downlink_push",
            MessageCategory::DownlinkReplace => "downlink_replace",
        }
    }
}

impl fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known category.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown message category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for MessageCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}
