//! JSON wire format.
//!
//! Field names follow the snake_case message model; raw frame payloads are
//! standard base64 strings. An uplink is a single object whose event sits
//! under its category key:
//! ```text
//! {"end_device_ids":{...},"received_at":"...","uplink_message":{"f_port":1,"frm_payload":"AQ=="}}
//! ```

use ps_protocol::{
    ApplicationDownlink, ApplicationDownlinks, ApplicationUp, DownlinkQueueRequest, UpEvent,
};

use crate::Formatter;
use crate::error::{FormatError, FormatResult};

/// Highest application FPort; 224 and above are reserved.
const MAX_APPLICATION_F_PORT: u32 = 223;

/// The `json` format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode_up(&self, up: &ApplicationUp) -> FormatResult<Vec<u8>> {
        check_up(up)?;
        serde_json::to_vec(up).map_err(|e| FormatError::EncodingFailed(e.to_string()))
    }

    fn decode_downlinks(&self, payload: &[u8]) -> FormatResult<ApplicationDownlinks> {
        let batch: ApplicationDownlinks = serde_json::from_slice(payload)
            .map_err(|e| FormatError::DecodingFailed(e.to_string()))?;
        batch.downlinks.iter().try_for_each(check_downlink)?;
        Ok(batch)
    }

    fn decode_downlink_queue_request(&self, payload: &[u8]) -> FormatResult<DownlinkQueueRequest> {
        let request: DownlinkQueueRequest = serde_json::from_slice(payload)
            .map_err(|e| FormatError::DecodingFailed(e.to_string()))?;
        request.downlinks.iter().try_for_each(check_downlink)?;
        Ok(request)
    }
}

/// FPort 0 carries MAC commands only, so an application payload on it
/// cannot be represented.
fn check_up(up: &ApplicationUp) -> FormatResult<()> {
    let (f_port, payload_len) = match &up.event {
        UpEvent::UplinkMessage(msg) => (msg.f_port, msg.frm_payload.len()),
        UpEvent::DownlinkAck(dl)
        | UpEvent::DownlinkNack(dl)
        | UpEvent::DownlinkSent(dl)
        | UpEvent::DownlinkQueued(dl) => (dl.f_port, dl.frm_payload.len()),
        UpEvent::DownlinkFailed(failed) => {
            (failed.downlink.f_port, failed.downlink.frm_payload.len())
        }
        UpEvent::JoinAccept(_) | UpEvent::LocationSolved(_) => return Ok(()),
    };
    if f_port == 0 && payload_len > 0 {
        return Err(FormatError::EncodingFailed(format!(
            "{} carries {payload_len} payload bytes on FPort 0",
            up.category()
        )));
    }
    Ok(())
}

fn check_downlink(downlink: &ApplicationDownlink) -> FormatResult<()> {
    if !(1..=MAX_APPLICATION_F_PORT).contains(&downlink.f_port) {
        return Err(FormatError::DecodingFailed(format!(
            "downlink FPort {} outside 1..={MAX_APPLICATION_F_PORT}",
            downlink.f_port
        )));
    }
    Ok(())
}
