//! Connection lifecycle: open with all-or-nothing rollback, graceful shutdown.
//!
//! ```text
//! Opening ──► Open ──► Closing ──► Closed
//!    │
//!    └──► Failed   (every handle opened so far, and the session, closed)
//! ```
//!
//! Categories open in the fixed order of [`MessageCategory::OUTBOUND`] then
//! [`MessageCategory::INBOUND`]. Handles are pushed onto an `OpenedHandles`
//! stack as they open; any failure unwinds that stack once and returns the
//! error, so a caller either gets a fully wired connection or nothing.

use std::future::Future;
use std::time::Duration;

use ps_protocol::topics::build_topic;
use ps_protocol::{MessageCategory, PubSubDescriptor, PubSubIds};
use tokio::sync::watch;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{Provider, Publisher, Session, Subscription};
use crate::registry::ProviderRegistry;

/// Default bound for connect, topic open and disconnect.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// Timeouts applied while opening a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Bound on establishing the backend session.
    pub connect_timeout: Duration,
    /// Bound on opening each publisher or subscription.
    pub topic_timeout: Duration,
    /// Bound on closing the session when an open attempt is rolled back.
    pub shutdown_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_TIMEOUT,
            topic_timeout: DEFAULT_TIMEOUT,
            shutdown_timeout: DEFAULT_TIMEOUT,
        }
    }
}

// ── Cancellation ──────────────────────────────────────────────

/// Fires a [`CancelSignal`].
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Caller-supplied cancellation for [`Connection::open`].
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancelled. Never resolves if the handle is dropped
    /// without cancelling.
    pub async fn cancelled(&mut self) {
        let dropped = self.0.wait_for(|cancelled| *cancelled).await.is_err();
        if dropped {
            std::future::pending::<()>().await;
        }
    }
}

/// Create a linked cancel handle and signal.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelSignal(rx))
}

/// Why a bounded step did not produce a result.
enum Interrupted {
    Elapsed,
    Cancelled,
}

/// Run `step` bounded by `timeout` and the optional cancel signal.
async fn bounded<T>(
    timeout: Duration,
    cancel: &mut Option<CancelSignal>,
    step: impl Future<Output = ProviderResult<T>>,
) -> Result<ProviderResult<T>, Interrupted> {
    let cancelled = async {
        match cancel {
            Some(signal) => signal.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        biased;
        () = cancelled => Err(Interrupted::Cancelled),
        result = tokio::time::timeout(timeout, step) => result.map_err(|_| Interrupted::Elapsed),
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis().try_into().unwrap_or(u64::MAX)
}

// ── Rollback stack ────────────────────────────────────────────

/// Handles opened so far during `Opening`.
struct OpenedHandles {
    session: Box<dyn Session>,
    publishers: Vec<(MessageCategory, Box<dyn Publisher>)>,
    subscriptions: Vec<(MessageCategory, Box<dyn Subscription>)>,
}

impl OpenedHandles {
    fn new(session: Box<dyn Session>) -> Self {
        Self {
            session,
            publishers: Vec::new(),
            subscriptions: Vec::new(),
        }
    }

    /// Close everything in reverse open order, then the session.
    async fn unwind(self, ids: &PubSubIds, options: &ConnectOptions) {
        for (category, subscription) in self.subscriptions.into_iter().rev() {
            close_subscription(ids, category, subscription, options.topic_timeout).await;
        }
        for (category, publisher) in self.publishers.into_iter().rev() {
            close_publisher(ids, category, publisher, options.topic_timeout).await;
        }
        close_session(ids, self.session, options.shutdown_timeout).await;
    }

    fn into_connection(self, ids: PubSubIds) -> Connection {
        let mut connection = Connection {
            ids,
            session: self.session,
            publishers: std::array::from_fn(|_| None),
            subscriptions: std::array::from_fn(|_| None),
        };
        for (category, publisher) in self.publishers {
            if let Some(i) = outbound_slot(category) {
                connection.publishers[i] = Some(publisher);
            }
        }
        for (category, subscription) in self.subscriptions {
            if let Some(i) = inbound_slot(category) {
                connection.subscriptions[i] = Some(subscription);
            }
        }
        connection
    }
}

async fn close_publisher(
    ids: &PubSubIds,
    category: MessageCategory,
    publisher: Box<dyn Publisher>,
    timeout: Duration,
) {
    let topic = publisher.topic().to_string();
    match tokio::time::timeout(timeout, publisher.close()).await {
        Ok(Ok(())) => tracing::debug!(pub_sub = %ids, %category, %topic, "publisher closed"),
        Ok(Err(e)) => {
            tracing::warn!(pub_sub = %ids, %category, %topic, error = %e, "failed to close publisher")
        }
        Err(_) => tracing::warn!(pub_sub = %ids, %category, %topic, "publisher close timed out"),
    }
}

async fn close_subscription(
    ids: &PubSubIds,
    category: MessageCategory,
    subscription: Box<dyn Subscription>,
    timeout: Duration,
) {
    let topic = subscription.topic().to_string();
    match tokio::time::timeout(timeout, subscription.close()).await {
        Ok(Ok(())) => tracing::debug!(pub_sub = %ids, %category, %topic, "subscription closed"),
        Ok(Err(e)) => {
            tracing::warn!(pub_sub = %ids, %category, %topic, error = %e, "failed to close subscription")
        }
        Err(_) => tracing::warn!(pub_sub = %ids, %category, %topic, "subscription close timed out"),
    }
}

/// Best-effort session close. Never fails outward.
async fn close_session(ids: &PubSubIds, session: Box<dyn Session>, timeout: Duration) {
    match tokio::time::timeout(timeout, session.close(timeout)).await {
        Ok(Ok(())) => tracing::debug!(pub_sub = %ids, "session closed"),
        Ok(Err(e)) => {
            tracing::warn!(pub_sub = %ids, error = %e, "backend reported an error on disconnect")
        }
        Err(_) => tracing::warn!(
            pub_sub = %ids,
            timeout_ms = millis(timeout),
            "disconnect timed out"
        ),
    }
}

fn outbound_slot(category: MessageCategory) -> Option<usize> {
    MessageCategory::OUTBOUND.iter().position(|c| *c == category)
}

fn inbound_slot(category: MessageCategory) -> Option<usize> {
    MessageCategory::INBOUND.iter().position(|c| *c == category)
}

// ── Connection ────────────────────────────────────────────────

/// An open backend session wired to the topics of one descriptor.
///
/// Holds exactly one handle per configured category. Must be released with
/// [`shutdown`](Self::shutdown); dropping it skips the graceful disconnect.
pub struct Connection {
    ids: PubSubIds,
    session: Box<dyn Session>,
    publishers: [Option<Box<dyn Publisher>>; MessageCategory::OUTBOUND.len()],
    subscriptions: [Option<Box<dyn Subscription>>; MessageCategory::INBOUND.len()],
}

impl Connection {
    /// Resolve the provider for `descriptor` and open a connection.
    pub async fn open(
        registry: &ProviderRegistry,
        descriptor: &PubSubDescriptor,
        options: &ConnectOptions,
        cancel: Option<CancelSignal>,
    ) -> ProviderResult<Self> {
        let provider = registry.resolve(descriptor)?;
        Self::open_with(provider.as_ref(), descriptor, options, cancel).await
    }

    /// Open a connection through an already resolved provider.
    ///
    /// # Panics
    ///
    /// If `provider` serves a different backend than `descriptor` selects.
    pub async fn open_with(
        provider: &dyn Provider,
        descriptor: &PubSubDescriptor,
        options: &ConnectOptions,
        mut cancel: Option<CancelSignal>,
    ) -> ProviderResult<Self> {
        assert_eq!(
            provider.tag(),
            descriptor.provider_tag(),
            "provider resolved for the wrong backend"
        );
        let ids = &descriptor.ids;

        let session = match bounded(
            options.connect_timeout,
            &mut cancel,
            provider.open_session(&descriptor.provider),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return Err(e),
            Err(Interrupted::Elapsed) => {
                return Err(ProviderError::ConnectTimeout {
                    timeout_ms: millis(options.connect_timeout),
                });
            }
            Err(Interrupted::Cancelled) => return Err(ProviderError::Cancelled),
        };
        tracing::debug!(pub_sub = %ids, backend = %descriptor.provider_tag(), "session open");

        let mut opened = OpenedHandles::new(session);
        let publish_qos = descriptor.provider.publish_qos();
        for (category, relative) in descriptor.topics.configured_outbound() {
            let topic = build_topic(&descriptor.base_topic, relative);
            let step = opened.session.open_publisher(&topic, publish_qos);
            match open_topic(category, options.topic_timeout, &mut cancel, step).await {
                Ok(publisher) => {
                    tracing::debug!(pub_sub = %ids, %category, %topic, "publisher open");
                    opened.publishers.push((category, publisher));
                }
                Err(err) => return Err(roll_back(opened, ids, options, err).await),
            }
        }

        let subscribe_qos = descriptor.provider.subscribe_qos();
        for (category, relative) in descriptor.topics.configured_inbound() {
            let topic = build_topic(&descriptor.base_topic, relative);
            let step = opened.session.open_subscription(&topic, subscribe_qos);
            match open_topic(category, options.topic_timeout, &mut cancel, step).await {
                Ok(subscription) => {
                    tracing::debug!(pub_sub = %ids, %category, %topic, "subscription open");
                    opened.subscriptions.push((category, subscription));
                }
                Err(err) => return Err(roll_back(opened, ids, options, err).await),
            }
        }

        let connection = opened.into_connection(ids.clone());
        tracing::info!(
            pub_sub = %ids,
            backend = %descriptor.provider_tag(),
            categories = connection.open_categories().len(),
            "connection open"
        );
        Ok(connection)
    }

    pub fn ids(&self) -> &PubSubIds {
        &self.ids
    }

    /// Publisher for an outbound category, if configured.
    pub fn publisher(&self, category: MessageCategory) -> Option<&dyn Publisher> {
        let slot = outbound_slot(category)?;
        self.publishers[slot].as_deref()
    }

    /// Subscription for an inbound category, if configured and not taken.
    pub fn subscription_mut(&mut self, category: MessageCategory) -> Option<&mut Box<dyn Subscription>> {
        let slot = inbound_slot(category)?;
        self.subscriptions[slot].as_mut()
    }

    /// Move a subscription out, e.g. into a receive task. The taker becomes
    /// responsible for closing it.
    pub fn take_subscription(&mut self, category: MessageCategory) -> Option<Box<dyn Subscription>> {
        let slot = inbound_slot(category)?;
        self.subscriptions[slot].take()
    }

    /// Categories whose handle is currently held by this connection, in
    /// open order.
    pub fn open_categories(&self) -> Vec<MessageCategory> {
        let outbound = MessageCategory::OUTBOUND
            .into_iter()
            .zip(&self.publishers)
            .filter(|(_, p)| p.is_some())
            .map(|(c, _)| c);
        let inbound = MessageCategory::INBOUND
            .into_iter()
            .zip(&self.subscriptions)
            .filter(|(_, s)| s.is_some())
            .map(|(c, _)| c);
        outbound.chain(inbound).collect()
    }

    /// Close every handle and the session. Backend errors and timeouts are
    /// logged; shutdown always completes.
    pub async fn shutdown(self, timeout: Duration) {
        let Connection {
            ids,
            session,
            publishers,
            subscriptions,
        } = self;

        for (category, subscription) in MessageCategory::INBOUND.into_iter().zip(subscriptions) {
            if let Some(subscription) = subscription {
                close_subscription(&ids, category, subscription, timeout).await;
            }
        }
        for (category, publisher) in MessageCategory::OUTBOUND.into_iter().zip(publishers) {
            if let Some(publisher) = publisher {
                close_publisher(&ids, category, publisher, timeout).await;
            }
        }
        close_session(&ids, session, timeout).await;
        tracing::info!(pub_sub = %ids, "connection closed");
    }
}

/// Open one topic handle, mapping backend errors and timeouts to the
/// category that failed.
async fn open_topic<T>(
    category: MessageCategory,
    timeout: Duration,
    cancel: &mut Option<CancelSignal>,
    step: impl Future<Output = ProviderResult<T>>,
) -> ProviderResult<T> {
    match bounded(timeout, cancel, step).await {
        Ok(Ok(handle)) => Ok(handle),
        Ok(Err(e)) => Err(ProviderError::TopicOpenFailed {
            category,
            reason: e.to_string(),
        }),
        Err(Interrupted::Elapsed) => Err(ProviderError::TopicOpenFailed {
            category,
            reason: format!("timed out after {}ms", millis(timeout)),
        }),
        Err(Interrupted::Cancelled) => Err(ProviderError::Cancelled),
    }
}

async fn roll_back(
    opened: OpenedHandles,
    ids: &PubSubIds,
    options: &ConnectOptions,
    err: ProviderError,
) -> ProviderError {
    tracing::warn!(
        pub_sub = %ids,
        error = %err,
        publishers = opened.publishers.len(),
        subscriptions = opened.subscriptions.len(),
        "connection open failed, rolling back"
    );
    opened.unwind(ids, options).await;
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ps_protocol::{
        CategoryTopics, MqttSettings, NatsSettings, ProviderSettings, ProviderTag, Qos,
    };

    use crate::mock::{HandleKind, MockProvider};

    fn mqtt_settings() -> MqttSettings {
        MqttSettings {
            server_url: "tcp://mock:1883".into(),
            client_id: "test".into(),
            username: None,
            password: None,
            use_tls: false,
            tls_ca: None,
            tls_client_cert: None,
            tls_client_key: None,
            publish_qos: Qos::AtLeastOnce,
            subscribe_qos: Qos::ExactlyOnce,
            keepalive_secs: 30,
        }
    }

    fn descriptor(topics: CategoryTopics) -> PubSubDescriptor {
        PubSubDescriptor {
            ids: PubSubIds {
                application_id: "app-1".into(),
                pub_sub_id: "ps-1".into(),
            },
            provider: ProviderSettings::Mqtt(mqtt_settings()),
            format: "json".into(),
            base_topic: "v3/app-1".into(),
            topics,
        }
    }

    fn all_topics() -> CategoryTopics {
        MessageCategory::ALL
            .into_iter()
            .fold(CategoryTopics::default(), |topics, c| topics.with(c, c.as_str()))
    }

    fn registry_with(mock: Arc<MockProvider>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register(ProviderTag::Mqtt, mock).unwrap();
        registry
    }

    #[tokio::test]
    async fn opens_exactly_the_configured_categories() {
        let subsets: Vec<Vec<MessageCategory>> = vec![
            vec![],
            vec![MessageCategory::UplinkMessage],
            vec![MessageCategory::DownlinkPush],
            vec![
                MessageCategory::JoinAccept,
                MessageCategory::LocationSolved,
                MessageCategory::DownlinkReplace,
            ],
            MessageCategory::ALL.to_vec(),
        ];

        for subset in subsets {
            let mock = Arc::new(MockProvider::new(ProviderTag::Mqtt));
            let registry = registry_with(mock.clone());
            let topics = subset
                .iter()
                .fold(CategoryTopics::default(), |t, c| t.with(*c, c.as_str()));

            let connection = Connection::open(
                &registry,
                &descriptor(topics),
                &ConnectOptions::default(),
                None,
            )
            .await
            .unwrap();

            assert_eq!(connection.open_categories(), subset);
            assert_eq!(mock.opened().len(), subset.len());
            connection.shutdown(DEFAULT_TIMEOUT).await;
            assert!(mock.leaked().is_empty());
        }
    }

    #[tokio::test]
    async fn topics_are_composed_with_base_and_qos() {
        let mock = Arc::new(MockProvider::new(ProviderTag::Mqtt));
        let registry = registry_with(mock.clone());
        let topics = CategoryTopics::default()
            .with(MessageCategory::UplinkMessage, "up")
            .with(MessageCategory::DownlinkPush, "down/push");

        let connection = Connection::open(
            &registry,
            &descriptor(topics),
            &ConnectOptions::default(),
            None,
        )
        .await
        .unwrap();

        let opened = mock.opened();
        assert_eq!(opened[0].topic, "v3/app-1/up");
        assert_eq!(opened[0].kind, HandleKind::Publisher);
        assert_eq!(opened[0].qos, Qos::AtLeastOnce);
        assert_eq!(opened[1].topic, "v3/app-1/down/push");
        assert_eq!(opened[1].kind, HandleKind::Subscription);
        assert_eq!(opened[1].qos, Qos::ExactlyOnce);
        assert_eq!(
            connection.publisher(MessageCategory::UplinkMessage).map(|p| p.topic()),
            Some("v3/app-1/up")
        );
        assert!(connection.publisher(MessageCategory::JoinAccept).is_none());
        assert!(connection.publisher(MessageCategory::DownlinkPush).is_none());
        connection.shutdown(DEFAULT_TIMEOUT).await;
    }

    #[tokio::test]
    async fn failure_at_kth_category_rolls_back_everything() {
        let total = MessageCategory::ALL.len();
        for k in 1..=total {
            let mock = Arc::new(MockProvider::new(ProviderTag::Mqtt).failing_topic_at(k));
            let registry = registry_with(mock.clone());

            let err = Connection::open(
                &registry,
                &descriptor(all_topics()),
                &ConnectOptions::default(),
                None,
            )
            .await
            .err()
            .expect("open should fail");

            let failing = MessageCategory::ALL[k - 1];
            assert!(
                matches!(err, ProviderError::TopicOpenFailed { category, .. } if category == failing),
                "k={k}: {err}"
            );
            assert_eq!(mock.closed().len(), k - 1, "k={k}");
            assert_eq!(mock.sessions_closed(), 1, "k={k}");
            assert!(mock.leaked().is_empty(), "k={k}");
        }
    }

    #[tokio::test]
    async fn rollback_closes_in_reverse_order() {
        let mock = Arc::new(MockProvider::new(ProviderTag::Mqtt).failing_topic_at(4));
        let registry = registry_with(mock.clone());
        let topics = CategoryTopics::default()
            .with(MessageCategory::UplinkMessage, "up")
            .with(MessageCategory::JoinAccept, "join")
            .with(MessageCategory::DownlinkPush, "push")
            .with(MessageCategory::DownlinkReplace, "replace");

        let result =
            Connection::open(&registry, &descriptor(topics), &ConnectOptions::default(), None).await;
        assert!(result.is_err());

        let closed: Vec<_> = mock.closed().into_iter().map(|h| h.topic).collect();
        assert_eq!(closed, vec!["v3/app-1/push", "v3/app-1/join", "v3/app-1/up"]);
    }

    #[tokio::test]
    async fn session_failure_has_nothing_to_roll_back() {
        let mock = Arc::new(MockProvider::new(ProviderTag::Mqtt).failing_session("refused"));
        let registry = registry_with(mock.clone());

        let err = Connection::open(
            &registry,
            &descriptor(all_topics()),
            &ConnectOptions::default(),
            None,
        )
        .await
        .err()
        .expect("open should fail");

        assert!(matches!(err, ProviderError::Connection(ref r) if r == "refused"));
        assert!(mock.opened().is_empty());
        assert_eq!(mock.sessions_closed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_session_times_out() {
        let mock = Arc::new(MockProvider::new(ProviderTag::Mqtt).hanging_session());
        let registry = registry_with(mock.clone());
        let options = ConnectOptions {
            connect_timeout: Duration::from_secs(3),
            ..ConnectOptions::default()
        };

        let err = Connection::open(&registry, &descriptor(all_topics()), &options, None)
            .await
            .err()
            .expect("open should time out");

        assert!(matches!(err, ProviderError::ConnectTimeout { timeout_ms: 3000 }));
        assert_eq!(mock.sessions_opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_beats_timeout() {
        let mock = Arc::new(MockProvider::new(ProviderTag::Mqtt).hanging_session());
        let registry = registry_with(mock.clone());
        let (handle, signal) = cancel_pair();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.cancel();
        });

        let err = Connection::open(
            &registry,
            &descriptor(all_topics()),
            &ConnectOptions::default(),
            Some(signal),
        )
        .await
        .err()
        .expect("open should be cancelled");

        assert!(matches!(err, ProviderError::Cancelled));
        canceller.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_topic_open_rolls_back() {
        let mock = Arc::new(MockProvider::new(ProviderTag::Mqtt).hanging_topic_at(3));
        let registry = registry_with(mock.clone());
        let (handle, signal) = cancel_pair();

        let open = tokio::spawn({
            let registry = registry;
            async move {
                Connection::open(
                    &registry,
                    &descriptor(all_topics()),
                    &ConnectOptions::default(),
                    Some(signal),
                )
                .await
                .map(|_| ())
            }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();

        let err = open.await.unwrap().unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
        assert_eq!(mock.closed().len(), 2);
        assert_eq!(mock.sessions_closed(), 1);
        assert!(mock.leaked().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_topic_open_fails_that_category() {
        let mock = Arc::new(MockProvider::new(ProviderTag::Mqtt).hanging_topic_at(1));
        let registry = registry_with(mock.clone());

        let err = Connection::open(
            &registry,
            &descriptor(all_topics()),
            &ConnectOptions::default(),
            None,
        )
        .await
        .err()
        .expect("open should fail");

        assert!(matches!(
            err,
            ProviderError::TopicOpenFailed {
                category: MessageCategory::UplinkMessage,
                ..
            }
        ));
        assert_eq!(mock.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn shutdown_absorbs_disconnect_errors() {
        let mock = Arc::new(MockProvider::new(ProviderTag::Mqtt).failing_disconnect());
        let registry = registry_with(mock.clone());

        let connection = Connection::open(
            &registry,
            &descriptor(all_topics()),
            &ConnectOptions::default(),
            None,
        )
        .await
        .unwrap();
        connection.shutdown(DEFAULT_TIMEOUT).await;

        assert_eq!(mock.sessions_closed(), 1);
        assert!(mock.leaked().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_completes_when_disconnect_hangs() {
        let mock = Arc::new(MockProvider::new(ProviderTag::Mqtt).hanging_disconnect());
        let registry = registry_with(mock.clone());

        let connection = Connection::open(
            &registry,
            &descriptor(CategoryTopics::default()),
            &ConnectOptions::default(),
            None,
        )
        .await
        .unwrap();
        connection.shutdown(Duration::from_secs(2)).await;

        assert_eq!(mock.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn taken_subscription_is_not_closed_by_shutdown() {
        let mock = Arc::new(MockProvider::new(ProviderTag::Mqtt));
        let registry = registry_with(mock.clone());
        let topics = CategoryTopics::default().with(MessageCategory::DownlinkPush, "push");

        let mut connection =
            Connection::open(&registry, &descriptor(topics), &ConnectOptions::default(), None)
                .await
                .unwrap();
        let mut subscription = connection
            .take_subscription(MessageCategory::DownlinkPush)
            .unwrap();
        assert!(connection.open_categories().is_empty());

        mock.inject("v3/app-1/push", b"payload".to_vec());
        assert_eq!(subscription.recv().await.unwrap(), b"payload");

        connection.shutdown(DEFAULT_TIMEOUT).await;
        assert_eq!(mock.leaked().len(), 1);
        subscription.close().await.unwrap();
        assert!(mock.leaked().is_empty());
    }

    #[tokio::test]
    async fn unregistered_backend_is_unsupported() {
        let registry = registry_with(Arc::new(MockProvider::new(ProviderTag::Mqtt)));
        let mut nats = descriptor(all_topics());
        nats.provider = ProviderSettings::Nats(NatsSettings {
            server_url: "nats://localhost".into(),
        });

        let err = Connection::open(&registry, &nats, &ConnectOptions::default(), None)
            .await
            .err()
            .expect("open should fail");
        assert!(matches!(err, ProviderError::UnsupportedBackend(ProviderTag::Nats)));
    }

    #[tokio::test]
    #[should_panic(expected = "wrong backend")]
    async fn mismatched_provider_panics() {
        let mock = MockProvider::new(ProviderTag::Nats);
        let _ = Connection::open_with(
            &mock,
            &descriptor(all_topics()),
            &ConnectOptions::default(),
            None,
        )
        .await;
    }
}
