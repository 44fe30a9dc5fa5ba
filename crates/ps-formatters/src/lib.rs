//! Wire formats for application pub/sub integrations.
//!
//! A [`Formatter`] turns [`ApplicationUp`] events into backend payloads and
//! backend payloads into downlink commands. Formats are looked up by name
//! from a static registry; any backend can be paired with any format.

pub mod error;
pub mod json;
pub mod registry;

use ps_protocol::{ApplicationDownlinks, ApplicationUp, DownlinkQueueRequest};

pub use error::{FormatError, FormatResult};
pub use json::JsonFormatter;
pub use registry::{Format, lookup, names};

/// Encoder/decoder pair for one named wire format. Implementations are
/// stateless.
pub trait Formatter: Send + Sync {
    /// Registry name of the format (e.g. `"json"`).
    fn name(&self) -> &'static str;

    /// Serialize an outbound application event.
    fn encode_up(&self, up: &ApplicationUp) -> FormatResult<Vec<u8>>;

    /// Parse a push payload into zero or more downlinks.
    fn decode_downlinks(&self, payload: &[u8]) -> FormatResult<ApplicationDownlinks>;

    /// Parse a replace payload into a queue request.
    fn decode_downlink_queue_request(&self, payload: &[u8]) -> FormatResult<DownlinkQueueRequest>;
}
