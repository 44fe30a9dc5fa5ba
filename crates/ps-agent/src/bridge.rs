//! All integrations configured for this agent.

use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;

use ps_protocol::ApplicationUp;
use ps_provider::{CancelSignal, ProviderRegistry};

use crate::config::AgentConfig;
use crate::error::{AgentError, AgentResult};
use crate::integration::{Integration, IntegrationEvent};

pub struct Bridge {
    integrations: Vec<Integration>,
}

impl Bridge {
    /// Start one integration per configured descriptor, all at once.
    ///
    /// An integration that fails to start is logged and left out; the others
    /// keep running. Integrations keep their configured order. Once `cancel`
    /// fires, starts still in progress abort.
    pub async fn start(
        config: &AgentConfig,
        registry: &ProviderRegistry,
        cancel: Option<CancelSignal>,
        events: mpsc::Sender<IntegrationEvent>,
    ) -> Self {
        let options = config.connect_options();
        if cancel.as_ref().is_some_and(CancelSignal::is_cancelled) {
            tracing::info!("startup cancelled before any integration started");
            return Self {
                integrations: Vec::new(),
            };
        }

        let starts = config.integrations.iter().map(|descriptor| {
            Integration::start(registry, descriptor, &options, cancel.clone(), events.clone())
        });
        let results = join_all(starts).await;

        let mut integrations = Vec::with_capacity(results.len());
        for (descriptor, result) in config.integrations.iter().zip(results) {
            match result {
                Ok(integration) => integrations.push(integration),
                Err(e) => tracing::error!(
                    application_id = %descriptor.ids.application_id,
                    pub_sub_id = %descriptor.ids.pub_sub_id,
                    error = %e,
                    "failed to start integration"
                ),
            }
        }

        tracing::info!(
            running = integrations.len(),
            configured = config.integrations.len(),
            "bridge started"
        );
        Self { integrations }
    }

    pub fn len(&self) -> usize {
        self.integrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.integrations.is_empty()
    }

    /// Publish `up` through every integration of its application. Returns
    /// the number of integrations that published it.
    pub async fn publish(&self, up: &ApplicationUp) -> AgentResult<usize> {
        let application_id = &up.end_device_ids.application_id;
        let mut matched = false;
        let mut published = 0;

        for integration in self
            .integrations
            .iter()
            .filter(|i| &i.ids().application_id == application_id)
        {
            matched = true;
            match integration.publish_up(up).await {
                Ok(true) => published += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    pub_sub = %integration.ids(),
                    category = %up.category(),
                    error = %e,
                    "failed to publish event"
                ),
            }
        }

        if !matched {
            return Err(AgentError::UnknownApplication(application_id.clone()));
        }
        Ok(published)
    }

    pub async fn shutdown(self, timeout: Duration) {
        for integration in self.integrations {
            integration.shutdown(timeout).await;
        }
        tracing::info!("bridge stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ps_protocol::{
        ApplicationDownlink, EndDeviceIds, MessageCategory, ProviderTag, UpEvent,
    };
    use ps_provider::MockProvider;

    const CONFIG: &str = r#"
[[integrations]]
application_id = "app-1"
pub_sub_id = "primary"
base_topic = "app-1"
provider = { type = "nats", server_url = "nats://mock" }
topics = { downlink_ack = "ack" }

[[integrations]]
application_id = "app-1"
pub_sub_id = "audit"
base_topic = "audit/app-1"
provider = { type = "nats", server_url = "nats://mock" }
topics = { downlink_ack = "ack", uplink_message = "up" }

[[integrations]]
application_id = "app-2"
pub_sub_id = "broken"
provider = { type = "mqtt", server_url = "tcp://unused" }
"#;

    fn ack(application_id: &str) -> ApplicationUp {
        ApplicationUp::new(
            EndDeviceIds::new(application_id, "dev-1"),
            UpEvent::DownlinkAck(ApplicationDownlink::new(1, vec![0xff])),
        )
    }

    async fn start(mock: Arc<MockProvider>) -> Bridge {
        let config: AgentConfig = toml::from_str(CONFIG).unwrap();
        let mut registry = ProviderRegistry::new();
        registry.register(ProviderTag::Nats, mock).unwrap();
        let (tx, _rx) = mpsc::channel(8);
        Bridge::start(&config, &registry, None, tx).await
    }

    #[tokio::test]
    async fn failed_integration_does_not_block_others() {
        let mock = Arc::new(MockProvider::new(ProviderTag::Nats));
        let bridge = start(mock.clone()).await;

        // app-2 selects MQTT, which this registry does not serve.
        assert_eq!(bridge.len(), 2);
        assert_eq!(mock.sessions_opened(), 2);
        bridge.shutdown(Duration::from_secs(1)).await;
        assert_eq!(mock.sessions_closed(), 2);
    }

    #[tokio::test]
    async fn publish_fans_out_to_every_integration_of_the_application() {
        let mock = Arc::new(MockProvider::new(ProviderTag::Nats));
        let bridge = start(mock.clone()).await;

        assert_eq!(bridge.publish(&ack("app-1")).await.unwrap(), 2);
        assert_eq!(mock.published_to("app-1/ack").len(), 1);
        assert_eq!(mock.published_to("audit/app-1/ack").len(), 1);
        assert_eq!(ack("app-1").category(), MessageCategory::DownlinkAck);
        bridge.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn unknown_application_is_an_error() {
        let mock = Arc::new(MockProvider::new(ProviderTag::Nats));
        let bridge = start(mock.clone()).await;

        let err = bridge.publish(&ack("app-9")).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownApplication(ref app) if app == "app-9"));
        // app-2 is configured but did not start.
        assert!(bridge.publish(&ack("app-2")).await.is_err());
        bridge.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_backends_time_out_together() {
        let mock = Arc::new(MockProvider::new(ProviderTag::Nats).hanging_session());
        let config: AgentConfig =
            toml::from_str(&format!("connect_timeout_secs = 3\n{CONFIG}")).unwrap();
        let mut registry = ProviderRegistry::new();
        registry.register(ProviderTag::Nats, mock).unwrap();

        let (tx, _rx) = mpsc::channel(8);
        let started = tokio::time::Instant::now();
        let bridge = Bridge::start(&config, &registry, None, tx).await;

        assert!(bridge.is_empty());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(6), "{elapsed:?}");
    }

    #[tokio::test]
    async fn cancelled_startup_opens_nothing() {
        let mock = Arc::new(MockProvider::new(ProviderTag::Nats));
        let config: AgentConfig = toml::from_str(CONFIG).unwrap();
        let mut registry = ProviderRegistry::new();
        registry.register(ProviderTag::Nats, mock.clone()).unwrap();
        let (handle, signal) = ps_provider::cancel_pair();
        handle.cancel();

        let (tx, _rx) = mpsc::channel(8);
        let bridge = Bridge::start(&config, &registry, Some(signal), tx).await;
        assert!(bridge.is_empty());
        assert_eq!(mock.sessions_opened(), 0);
    }
}
