//! MQTT provider backed by `rumqttc`.
//!
//! A session owns one `AsyncClient`. The event loop is polled inline until
//! the broker acknowledges the connection, so an abandoned open leaves no
//! task behind; after that a driver task polls it and routes incoming
//! publishes to the subscriptions whose filter matches.
//!
//! A subscription is only handed out once the broker has acknowledged it.
//! The driver pairs each outgoing SUBSCRIBE packet id with the waiter queued
//! for it and resolves the waiter on the matching SUBACK.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, SubAck,
    SubscribeReasonCode, Transport,
};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use ps_protocol::topics::topic_matches;
use ps_protocol::{MqttSettings, ProviderSettings, ProviderTag, Qos};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{Provider, Publisher, Session, Subscription};
use crate::tls;

/// Capacity of the client request queue.
const REQUEST_CAPACITY: usize = 64;
/// Buffered payloads per subscription. Further payloads are dropped until
/// the subscriber catches up.
const SUBSCRIPTION_CAPACITY: usize = 64;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(8);

/// Provider for `ProviderSettings::Mqtt`.
#[derive(Debug, Clone, Copy)]
pub struct MqttProvider {
    reconnect_delay: Duration,
    publish_timeout: Duration,
}

impl Default for MqttProvider {
    fn default() -> Self {
        Self {
            reconnect_delay: RECONNECT_DELAY,
            publish_timeout: PUBLISH_TIMEOUT,
        }
    }
}

impl MqttProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause between a lost connection and the next attempt.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Upper bound on handing one payload to the client.
    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    async fn connect(&self, settings: &MqttSettings) -> ProviderResult<MqttSession> {
        let options = mqtt_options(settings)?;
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        await_connack(&mut eventloop).await?;
        tracing::info!(server = %settings.server_url, client_id = %settings.client_id, "MQTT session connected");

        let router = Router::default();
        let driver = tokio::spawn(drive(
            eventloop,
            client.clone(),
            router.clone(),
            self.reconnect_delay,
        ));
        Ok(MqttSession {
            client,
            router,
            driver,
            next_route: AtomicU64::new(0),
            publish_timeout: self.publish_timeout,
        })
    }
}

#[async_trait]
impl Provider for MqttProvider {
    fn tag(&self) -> ProviderTag {
        ProviderTag::Mqtt
    }

    async fn open_session(&self, settings: &ProviderSettings) -> ProviderResult<Box<dyn Session>> {
        let ProviderSettings::Mqtt(settings) = settings else {
            return Err(ProviderError::Connection(format!(
                "MQTT provider cannot serve {} settings",
                settings.tag()
            )));
        };
        Ok(Box::new(self.connect(settings).await?))
    }
}

// ── Connection setup ──────────────────────────────────────────

/// Broker endpoint parsed from a server URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Parse `tcp://`, `mqtt://`, `ssl://`, `tls://` or `mqtts://` URLs. A bare
/// `host[:port]` is plaintext.
pub fn parse_server_url(url: &str) -> ProviderResult<BrokerAddress> {
    let (tls, rest) = match url.split_once("://") {
        Some(("tcp" | "mqtt", rest)) => (false, rest),
        Some(("ssl" | "tls" | "mqtts", rest)) => (true, rest),
        Some((scheme, _)) => {
            return Err(ProviderError::Connection(format!(
                "unsupported MQTT URL scheme '{scheme}'"
            )));
        }
        None => (false, url),
    };
    let authority = rest.split('/').next().unwrap_or_default();
    let default_port = if tls { 8883 } else { 1883 };

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| ProviderError::Connection(format!("invalid port in '{url}'")))?;
            (host, port)
        }
        None => (authority, default_port),
    };
    if host.is_empty() {
        return Err(ProviderError::Connection(format!("missing host in '{url}'")));
    }
    Ok(BrokerAddress {
        host: host.to_string(),
        port,
        tls,
    })
}

fn mqtt_options(settings: &MqttSettings) -> ProviderResult<MqttOptions> {
    let address = parse_server_url(&settings.server_url)?;
    let mut options = MqttOptions::new(&settings.client_id, &address.host, address.port);
    options.set_keep_alive(Duration::from_secs(settings.keepalive_secs.into()));
    if let Some(username) = &settings.username {
        options.set_credentials(username, settings.password.as_deref().unwrap_or_default());
    }
    if address.tls || settings.use_tls {
        options.set_transport(tls::load_tls_transport(settings)?);
    } else {
        options.set_transport(Transport::Tcp);
    }
    Ok(options)
}

async fn await_connack(eventloop: &mut EventLoop) -> ProviderResult<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(ProviderError::Connection(format!(
                        "broker refused connection: {code:?}"
                    ))),
                };
            }
            Ok(_) => {}
            Err(e) => return Err(ProviderError::Connection(e.to_string())),
        }
    }
}

pub(crate) fn to_mqtt_qos(qos: Qos) -> QoS {
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
        Qos::ExactlyOnce => QoS::ExactlyOnce,
    }
}

// ── Routing ───────────────────────────────────────────────────

struct Route {
    id: u64,
    filter: String,
    qos: QoS,
    tx: mpsc::Sender<Vec<u8>>,
}

/// Waiter for one SUBACK. `None` stands for a resubscribe nobody awaits.
type AckWaiter = Option<oneshot::Sender<bool>>;

#[derive(Default)]
struct RouterState {
    routes: Vec<Route>,
    /// Waiters in the order their SUBSCRIBE entered the request queue.
    queued: VecDeque<AckWaiter>,
    /// Waiters whose SUBSCRIBE was written, by packet id.
    in_flight: HashMap<u16, AckWaiter>,
}

/// State shared by a session, its subscriptions and its driver. Never held
/// across an await.
#[derive(Clone, Default)]
struct Router(Arc<Mutex<RouterState>>);

impl Router {
    fn lock(&self) -> MutexGuard<'_, RouterState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_route(&self, id: u64) {
        self.lock().routes.retain(|r| r.id != id);
    }

    /// Deliver `payload` to every route whose filter matches `topic`.
    /// Returns the number of subscriptions reached. A subscription whose
    /// buffer is full misses the payload instead of stalling the driver.
    fn dispatch(&self, topic: &str, payload: &[u8]) -> usize {
        let state = self.lock();
        let mut delivered = 0;
        for route in state.routes.iter().filter(|r| topic_matches(&r.filter, topic)) {
            match route.tx.try_send(payload.to_vec()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(filter = %route.filter, %topic, "subscription buffer full, dropping message");
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    /// The SUBSCRIBE with `pkid` was written; it belongs to the oldest
    /// queued waiter.
    fn subscribe_sent(&self, pkid: u16) {
        let mut state = self.lock();
        if let Some(waiter) = state.queued.pop_front() {
            state.in_flight.insert(pkid, waiter);
        }
    }

    fn acknowledge(&self, ack: &SubAck) {
        let accepted = !ack.return_codes.contains(&SubscribeReasonCode::Failure);
        match self.lock().in_flight.remove(&ack.pkid) {
            Some(Some(waiter)) => {
                // The opener may have given up already.
                let _ = waiter.send(accepted);
            }
            Some(None) if !accepted => {
                tracing::warn!(pkid = ack.pkid, "broker rejected resubscription");
            }
            _ => {}
        }
    }

    /// Fail waiters whose SUBSCRIBE died with the connection.
    fn connection_lost(&self) {
        self.lock().in_flight.clear();
    }

    /// Dropping the senders ends every subscription stream and fails every
    /// pending open.
    fn close(&self) {
        let mut state = self.lock();
        state.routes.clear();
        state.queued.clear();
        state.in_flight.clear();
    }
}

/// Removes a route registered ahead of its SUBACK unless the open completes.
struct PendingRoute {
    router: Router,
    id: Option<u64>,
}

impl PendingRoute {
    fn keep(mut self) {
        self.id = None;
    }
}

impl Drop for PendingRoute {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            self.router.remove_route(id);
        }
    }
}

/// Poll the event loop until the client disconnects.
async fn drive(mut eventloop: EventLoop, client: AsyncClient, router: Router, reconnect_delay: Duration) {
    let mut reconnecting = false;
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if router.dispatch(&publish.topic, &publish.payload) == 0 {
                    tracing::debug!(topic = %publish.topic, "no subscription took incoming publish");
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) if reconnecting => {
                reconnecting = false;
                resubscribe(&client, &router);
            }
            Ok(Event::Outgoing(Outgoing::Subscribe(pkid))) => router.subscribe_sent(pkid),
            Ok(Event::Incoming(Packet::SubAck(ack))) => router.acknowledge(&ack),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("MQTT driver stopping after disconnect");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(
                    error = %e,
                    delay_ms = reconnect_delay.as_millis() as u64,
                    "MQTT event loop error, reconnecting"
                );
                reconnecting = true;
                router.connection_lost();
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }
    router.close();
}

/// Restore subscriptions after the broker dropped the session.
fn resubscribe(client: &AsyncClient, router: &Router) {
    let mut state = router.lock();
    let RouterState { routes, queued, .. } = &mut *state;
    for route in routes.iter() {
        match client.try_subscribe(route.filter.as_str(), route.qos) {
            Ok(()) => queued.push_back(None),
            Err(e) => tracing::warn!(filter = %route.filter, error = %e, "failed to resubscribe"),
        }
    }
}

// ── Session and handles ───────────────────────────────────────

struct MqttSession {
    client: AsyncClient,
    router: Router,
    driver: JoinHandle<()>,
    next_route: AtomicU64,
    publish_timeout: Duration,
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

#[async_trait]
impl Session for MqttSession {
    async fn open_publisher(&self, topic: &str, qos: Qos) -> ProviderResult<Box<dyn Publisher>> {
        Ok(Box::new(MqttPublisher {
            client: self.client.clone(),
            topic: topic.to_string(),
            qos: to_mqtt_qos(qos),
            timeout: self.publish_timeout,
        }))
    }

    async fn open_subscription(
        &self,
        topic: &str,
        qos: Qos,
    ) -> ProviderResult<Box<dyn Subscription>> {
        let qos = to_mqtt_qos(qos);
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        let (ack_tx, ack_rx) = oneshot::channel();
        let id = self.next_route.fetch_add(1, Ordering::Relaxed);

        // The route goes in before the SUBSCRIBE so nothing published right
        // after the SUBACK is missed. The waiter is queued under the same
        // lock as the request so both queues keep one order.
        {
            let mut state = self.router.lock();
            state.routes.push(Route {
                id,
                filter: topic.to_string(),
                qos,
                tx,
            });
            state.queued.push_back(Some(ack_tx));
            if let Err(e) = self.client.try_subscribe(topic, qos) {
                state.queued.pop_back();
                state.routes.retain(|r| r.id != id);
                return Err(ProviderError::Subscribe(e.to_string()));
            }
        }
        let pending = PendingRoute {
            router: self.router.clone(),
            id: Some(id),
        };

        match ack_rx.await {
            Ok(true) => {}
            Ok(false) => {
                return Err(ProviderError::Subscribe(format!(
                    "broker rejected subscription to '{topic}'"
                )));
            }
            Err(_) => {
                return Err(ProviderError::Subscribe(format!(
                    "connection lost before subscription to '{topic}' was acknowledged"
                )));
            }
        }
        pending.keep();

        Ok(Box::new(MqttSubscription {
            client: self.client.clone(),
            router: self.router.clone(),
            id,
            topic: topic.to_string(),
            rx,
        }))
    }

    async fn close(mut self: Box<Self>, timeout: Duration) -> ProviderResult<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| ProviderError::Disconnect(e.to_string()))?;
        match tokio::time::timeout(timeout, &mut self.driver).await {
            Ok(_) => Ok(()),
            Err(_) => Err(ProviderError::Disconnect(format!(
                "driver did not stop within {}ms",
                timeout.as_millis()
            ))),
        }
    }
}

struct MqttPublisher {
    client: AsyncClient,
    topic: String,
    qos: QoS,
    timeout: Duration,
}

#[async_trait]
impl Publisher for MqttPublisher {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn publish(&self, payload: &[u8]) -> ProviderResult<()> {
        let publish = self
            .client
            .publish(self.topic.as_str(), self.qos, false, payload.to_vec());
        match tokio::time::timeout(self.timeout, publish).await {
            Ok(result) => result.map_err(|e| ProviderError::Publish(e.to_string())),
            Err(_) => Err(ProviderError::Publish(format!(
                "publish to '{}' timed out after {}ms",
                self.topic,
                self.timeout.as_millis()
            ))),
        }
    }

    async fn close(self: Box<Self>) -> ProviderResult<()> {
        Ok(())
    }
}

struct MqttSubscription {
    client: AsyncClient,
    router: Router,
    id: u64,
    topic: String,
    rx: mpsc::Receiver<Vec<u8>>,
}

#[async_trait]
impl Subscription for MqttSubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    async fn close(self: Box<Self>) -> ProviderResult<()> {
        let shared = {
            let mut state = self.router.lock();
            state.routes.retain(|r| r.id != self.id);
            state.routes.iter().any(|r| r.filter == self.topic)
        };
        if shared {
            return Ok(());
        }
        self.client
            .unsubscribe(self.topic.as_str())
            .await
            .map_err(|e| ProviderError::Subscribe(e.to_string()))
    }
}
