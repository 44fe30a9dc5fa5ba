//! One running application pub/sub integration.
//!
//! Owns an open [`Connection`], the formatter selected for it, and one
//! receive task per inbound subscription. Receive tasks decode each payload
//! independently: a payload that fails to decode is logged and skipped.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use ps_formatters::{FormatResult, Formatter};
use ps_protocol::{
    ApplicationDownlinks, ApplicationUp, DownlinkQueueRequest, MessageCategory, PubSubDescriptor,
    PubSubIds,
};
use ps_provider::{CancelSignal, ConnectOptions, Connection, ProviderRegistry, Subscription};

use crate::error::AgentResult;

/// Downlink traffic decoded from an inbound subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum IntegrationEvent {
    /// Downlinks to append to device queues.
    Downlinks {
        ids: PubSubIds,
        downlinks: ApplicationDownlinks,
    },
    /// Replacement of one device's downlink queue.
    QueueReplace {
        ids: PubSubIds,
        request: DownlinkQueueRequest,
    },
}

pub struct Integration {
    ids: PubSubIds,
    formatter: &'static dyn Formatter,
    connection: Connection,
    stop: watch::Sender<bool>,
    receivers: Vec<JoinHandle<()>>,
}

impl Integration {
    /// Open the connection for `descriptor` and start its receive tasks.
    ///
    /// The format is resolved before any backend is contacted.
    pub async fn start(
        registry: &ProviderRegistry,
        descriptor: &PubSubDescriptor,
        options: &ConnectOptions,
        cancel: Option<CancelSignal>,
        events: mpsc::Sender<IntegrationEvent>,
    ) -> AgentResult<Self> {
        let formatter = ps_formatters::lookup(&descriptor.format)?;
        let mut connection = Connection::open(registry, descriptor, options, cancel).await?;

        let (stop, stop_rx) = watch::channel(false);
        let mut receivers = Vec::new();
        for category in MessageCategory::INBOUND {
            if let Some(subscription) = connection.take_subscription(category) {
                receivers.push(tokio::spawn(receive_loop(
                    descriptor.ids.clone(),
                    category,
                    subscription,
                    formatter,
                    events.clone(),
                    stop_rx.clone(),
                )));
            }
        }

        tracing::info!(
            pub_sub = %descriptor.ids,
            format = formatter.name(),
            receivers = receivers.len(),
            "integration started"
        );
        Ok(Self {
            ids: descriptor.ids.clone(),
            formatter,
            connection,
            stop,
            receivers,
        })
    }

    pub fn ids(&self) -> &PubSubIds {
        &self.ids
    }

    /// Encode `up` and publish it on the topic of its category.
    ///
    /// Returns `Ok(false)` when the category has no topic configured.
    pub async fn publish_up(&self, up: &ApplicationUp) -> AgentResult<bool> {
        let category = up.category();
        let Some(publisher) = self.connection.publisher(category) else {
            tracing::debug!(pub_sub = %self.ids, %category, "category not configured, dropping event");
            return Ok(false);
        };

        let mut up = up.clone();
        up.correlation_ids
            .push(format!("pubsub:up:{}", uuid::Uuid::now_v7()));
        let payload = self.formatter.encode_up(&up)?;
        publisher.publish(&payload).await?;

        tracing::debug!(
            pub_sub = %self.ids,
            %category,
            topic = publisher.topic(),
            device_id = %up.end_device_ids.device_id,
            bytes = payload.len(),
            "event published"
        );
        Ok(true)
    }

    /// Stop the receive tasks, then close the connection.
    pub async fn shutdown(self, timeout: Duration) {
        let Integration {
            ids,
            connection,
            stop,
            receivers,
            ..
        } = self;

        stop.send_replace(true);
        for mut receiver in receivers {
            if tokio::time::timeout(timeout, &mut receiver).await.is_err() {
                tracing::warn!(pub_sub = %ids, "receive task did not stop in time, aborting");
                receiver.abort();
            }
        }
        connection.shutdown(timeout).await;
        tracing::info!(pub_sub = %ids, "integration stopped");
    }
}

/// Decode one inbound payload according to its category.
pub fn decode_event(
    formatter: &dyn Formatter,
    ids: &PubSubIds,
    category: MessageCategory,
    payload: &[u8],
) -> FormatResult<Option<IntegrationEvent>> {
    let event = match category {
        MessageCategory::DownlinkPush => Some(IntegrationEvent::Downlinks {
            ids: ids.clone(),
            downlinks: formatter.decode_downlinks(payload)?,
        }),
        MessageCategory::DownlinkReplace => Some(IntegrationEvent::QueueReplace {
            ids: ids.clone(),
            request: formatter.decode_downlink_queue_request(payload)?,
        }),
        _ => None,
    };
    Ok(event)
}

async fn receive_loop(
    ids: PubSubIds,
    category: MessageCategory,
    mut subscription: Box<dyn Subscription>,
    formatter: &'static dyn Formatter,
    events: mpsc::Sender<IntegrationEvent>,
    mut stop: watch::Receiver<bool>,
) {
    let topic = subscription.topic().to_string();
    loop {
        let payload = tokio::select! {
            biased;
            _ = stop.wait_for(|stopped| *stopped) => break,
            payload = subscription.recv() => payload,
        };
        let Some(payload) = payload else {
            tracing::warn!(pub_sub = %ids, %category, %topic, "subscription stream ended");
            break;
        };

        match decode_event(formatter, &ids, category, &payload) {
            Ok(Some(event)) => {
                if events.send(event).await.is_err() {
                    tracing::debug!(pub_sub = %ids, %category, "event receiver dropped");
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    pub_sub = %ids,
                    %category,
                    %topic,
                    error = %e,
                    "dropping undecodable payload"
                );
            }
        }
    }

    if let Err(e) = subscription.close().await {
        tracing::warn!(pub_sub = %ids, %category, %topic, error = %e, "failed to close subscription");
    }
}
