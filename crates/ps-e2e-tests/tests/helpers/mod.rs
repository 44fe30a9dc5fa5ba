//! Shared test harness for E2E integration tests.
//!
//! Serves the MQTT backend tag from a `MockProvider`, so descriptors look
//! exactly like production configuration while no broker is contacted.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;

use ps_agent::{AgentConfig, Bridge, IntegrationEvent};
use ps_protocol::{
    ApplicationUp, CategoryTopics, EndDeviceIds, MessageCategory, MqttSettings, ProviderSettings,
    ProviderTag, PubSubDescriptor, PubSubIds, Qos, UpEvent, UplinkMessage,
};
use ps_provider::{MockProvider, ProviderRegistry};

pub struct TestHarness {
    /// Backend shared by every connection opened through `registry`.
    pub mock: Arc<MockProvider>,
    pub registry: ProviderRegistry,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_mock(MockProvider::new(ProviderTag::Mqtt))
    }

    /// Harness around a pre-scripted mock.
    pub fn with_mock(mock: MockProvider) -> Self {
        let mock = Arc::new(mock);
        let mut registry = ProviderRegistry::new();
        registry
            .register(ProviderTag::Mqtt, mock.clone())
            .expect("fresh registry");
        Self { mock, registry }
    }

    /// Start a bridge for `config_toml`, returning it with the event stream.
    pub async fn bridge(&self, config_toml: &str) -> (Bridge, mpsc::Receiver<IntegrationEvent>) {
        let config: AgentConfig = toml::from_str(config_toml).expect("valid config");
        config.validate().expect("config validates");
        let (tx, rx) = mpsc::channel(16);
        let bridge = Bridge::start(&config, &self.registry, None, tx).await;
        (bridge, rx)
    }
}

pub fn mqtt_settings() -> MqttSettings {
    MqttSettings {
        server_url: "tcp://broker.test:1883".into(),
        client_id: "e2e".into(),
        username: Some("app-1".into()),
        password: Some("secret".into()),
        use_tls: false,
        tls_ca: None,
        tls_client_cert: None,
        tls_client_key: None,
        publish_qos: Qos::AtLeastOnce,
        subscribe_qos: Qos::AtLeastOnce,
        keepalive_secs: 30,
    }
}

pub fn descriptor(application_id: &str, base_topic: &str, topics: CategoryTopics) -> PubSubDescriptor {
    PubSubDescriptor {
        ids: PubSubIds {
            application_id: application_id.into(),
            pub_sub_id: "e2e".into(),
        },
        provider: ProviderSettings::Mqtt(mqtt_settings()),
        format: "json".into(),
        base_topic: base_topic.into(),
        topics,
    }
}

/// Every category wired to its own name.
pub fn all_topics() -> CategoryTopics {
    MessageCategory::ALL
        .into_iter()
        .fold(CategoryTopics::default(), |t, c| t.with(c, c.as_str()))
}

pub fn received_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn uplink(application_id: &str, device_id: &str, f_port: u32, payload: &[u8]) -> ApplicationUp {
    let mut up = ApplicationUp::new(
        EndDeviceIds::new(application_id, device_id),
        UpEvent::UplinkMessage(UplinkMessage {
            session_key_id: None,
            f_port,
            f_cnt: 1,
            frm_payload: payload.to_vec(),
            decoded_payload: None,
        }),
    );
    up.received_at = received_at();
    up
}
