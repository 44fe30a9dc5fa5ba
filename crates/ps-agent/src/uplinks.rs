//! Newline-delimited `ApplicationUp` input.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use ps_protocol::ApplicationUp;

use crate::bridge::Bridge;

/// Totals for one input stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UplinkStats {
    pub published: usize,
    pub skipped: usize,
    pub invalid: usize,
}

/// Read one JSON `ApplicationUp` per line and publish each through `bridge`
/// until the input ends. Bad lines are logged and skipped.
pub async fn run<R: AsyncBufRead + Unpin>(reader: R, bridge: &Bridge) -> UplinkStats {
    let mut stats = UplinkStats::default();
    let mut lines = reader.lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "failed to read uplink input");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let up: ApplicationUp = match serde_json::from_str(line) {
            Ok(up) => up,
            Err(e) => {
                tracing::warn!(error = %e, "invalid uplink record");
                stats.invalid += 1;
                continue;
            }
        };
        match bridge.publish(&up).await {
            Ok(0) => stats.skipped += 1,
            Ok(_) => stats.published += 1,
            Err(e) => {
                tracing::warn!(error = %e, device_id = %up.end_device_ids.device_id, "uplink not published");
                stats.skipped += 1;
            }
        }
    }
    stats
}
