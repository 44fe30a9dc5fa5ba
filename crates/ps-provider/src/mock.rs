//! Mock provider for testing without a real backend.
//!
//! Records every session, topic handle, close and publish for assertion in
//! tests, and can be scripted to fail or hang at a given step. Payloads can
//! be injected into open subscriptions with [`MockProvider::inject`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ps_protocol::{ProviderSettings, ProviderTag, Qos};
use tokio::sync::mpsc;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{Provider, Publisher, Session, Subscription};

/// Kind of topic handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Publisher,
    Subscription,
}

/// A recorded topic handle open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedHandle {
    pub kind: HandleKind,
    pub topic: String,
    pub qos: Qos,
}

/// A recorded publish call.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Scripted misbehaviour.
#[derive(Debug, Clone, Default)]
struct Script {
    fail_session: Option<String>,
    hang_session: bool,
    /// 1-based ordinal of the topic open (publishers then subscriptions).
    fail_topic_at: Option<usize>,
    hang_topic_at: Option<usize>,
    fail_disconnect: bool,
    hang_disconnect: bool,
}

#[derive(Default)]
struct Record {
    sessions_opened: usize,
    sessions_closed: usize,
    opened: Vec<OpenedHandle>,
    closed: Vec<OpenedHandle>,
    published: Vec<PublishedMessage>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>,
}

struct MockState {
    script: Script,
    record: Mutex<Record>,
}

/// Mock implementation of the `Provider` trait.
///
/// Thread-safe via `Mutex` (fine for test contexts).
pub struct MockProvider {
    tag: ProviderTag,
    state: Arc<MockState>,
}

impl MockProvider {
    pub fn new(tag: ProviderTag) -> Self {
        Self::with_script(tag, Script::default())
    }

    fn with_script(tag: ProviderTag, script: Script) -> Self {
        Self {
            tag,
            state: Arc::new(MockState {
                script,
                record: Mutex::new(Record::default()),
            }),
        }
    }

    fn rescript(self, edit: impl FnOnce(&mut Script)) -> Self {
        let mut script = self.state.script.clone();
        edit(&mut script);
        Self::with_script(self.tag, script)
    }

    // ── Scripting (call before sharing) ───────────────────────

    /// Fail every session open with a connection error.
    pub fn failing_session(self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        self.rescript(|s| s.fail_session = Some(reason))
    }

    /// Never complete a session open.
    pub fn hanging_session(self) -> Self {
        self.rescript(|s| s.hang_session = true)
    }

    /// Fail the `nth` (1-based) topic open of a session.
    pub fn failing_topic_at(self, nth: usize) -> Self {
        self.rescript(|s| s.fail_topic_at = Some(nth))
    }

    /// Never complete the `nth` (1-based) topic open of a session.
    pub fn hanging_topic_at(self, nth: usize) -> Self {
        self.rescript(|s| s.hang_topic_at = Some(nth))
    }

    /// Report an error from every session close.
    pub fn failing_disconnect(self) -> Self {
        self.rescript(|s| s.fail_disconnect = true)
    }

    /// Never complete a session close.
    pub fn hanging_disconnect(self) -> Self {
        self.rescript(|s| s.hang_disconnect = true)
    }

    // ── Observation ───────────────────────────────────────────

    pub fn sessions_opened(&self) -> usize {
        self.state.record.lock().unwrap().sessions_opened
    }

    pub fn sessions_closed(&self) -> usize {
        self.state.record.lock().unwrap().sessions_closed
    }

    /// All topic handles ever opened, in open order.
    pub fn opened(&self) -> Vec<OpenedHandle> {
        self.state.record.lock().unwrap().opened.clone()
    }

    /// All topic handles closed, in close order.
    pub fn closed(&self) -> Vec<OpenedHandle> {
        self.state.record.lock().unwrap().closed.clone()
    }

    /// Topic handles opened but not yet closed.
    pub fn leaked(&self) -> Vec<OpenedHandle> {
        let record = self.state.record.lock().unwrap();
        let mut open = record.opened.clone();
        for closed in &record.closed {
            if let Some(pos) = open.iter().position(|h| h == closed) {
                open.remove(pos);
            }
        }
        open
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.record.lock().unwrap().published.clone()
    }

    /// Published messages for a specific topic.
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.state
            .record
            .lock()
            .unwrap()
            .published
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Deliver `payload` to every open subscription on `topic`. Returns the
    /// number of subscriptions reached.
    pub fn inject(&self, topic: &str, payload: impl Into<Vec<u8>>) -> usize {
        let payload = payload.into();
        let mut record = self.state.record.lock().unwrap();
        let Some(senders) = record.subscribers.get_mut(topic) else {
            return 0;
        };
        senders.retain(|tx| tx.send(payload.clone()).is_ok());
        senders.len()
    }

    /// End the payload stream of every subscription on `topic`.
    pub fn end_stream(&self, topic: &str) {
        self.state.record.lock().unwrap().subscribers.remove(topic);
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn tag(&self) -> ProviderTag {
        self.tag
    }

    async fn open_session(&self, _settings: &ProviderSettings) -> ProviderResult<Box<dyn Session>> {
        if self.state.script.hang_session {
            std::future::pending::<()>().await;
        }
        if let Some(reason) = &self.state.script.fail_session {
            return Err(ProviderError::Connection(reason.clone()));
        }
        self.state.record.lock().unwrap().sessions_opened += 1;
        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
            topic_opens: AtomicUsize::new(0),
        }))
    }
}

struct MockSession {
    state: Arc<MockState>,
    topic_opens: AtomicUsize,
}

impl MockSession {
    /// Apply the topic-open script, then record the handle.
    async fn open_handle(&self, kind: HandleKind, topic: &str, qos: Qos) -> ProviderResult<OpenedHandle> {
        let nth = self.topic_opens.fetch_add(1, Ordering::SeqCst) + 1;
        if self.state.script.hang_topic_at == Some(nth) {
            std::future::pending::<()>().await;
        }
        if self.state.script.fail_topic_at == Some(nth) {
            let reason = format!("scripted failure on topic open #{nth} ({topic})");
            return Err(match kind {
                HandleKind::Publisher => ProviderError::Publish(reason),
                HandleKind::Subscription => ProviderError::Subscribe(reason),
            });
        }
        let handle = OpenedHandle {
            kind,
            topic: topic.to_string(),
            qos,
        };
        self.state.record.lock().unwrap().opened.push(handle.clone());
        Ok(handle)
    }
}

#[async_trait]
impl Session for MockSession {
    async fn open_publisher(&self, topic: &str, qos: Qos) -> ProviderResult<Box<dyn Publisher>> {
        let handle = self.open_handle(HandleKind::Publisher, topic, qos).await?;
        Ok(Box::new(MockPublisher {
            handle,
            state: Arc::clone(&self.state),
        }))
    }

    async fn open_subscription(
        &self,
        topic: &str,
        qos: Qos,
    ) -> ProviderResult<Box<dyn Subscription>> {
        let handle = self.open_handle(HandleKind::Subscription, topic, qos).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.state
            .record
            .lock()
            .unwrap()
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        Ok(Box::new(MockSubscription {
            handle,
            rx,
            state: Arc::clone(&self.state),
        }))
    }

    async fn close(self: Box<Self>, _timeout: Duration) -> ProviderResult<()> {
        self.state.record.lock().unwrap().sessions_closed += 1;
        if self.state.script.hang_disconnect {
            std::future::pending::<()>().await;
        }
        if self.state.script.fail_disconnect {
            return Err(ProviderError::Disconnect("scripted disconnect failure".into()));
        }
        Ok(())
    }
}

struct MockPublisher {
    handle: OpenedHandle,
    state: Arc<MockState>,
}

#[async_trait]
impl Publisher for MockPublisher {
    fn topic(&self) -> &str {
        &self.handle.topic
    }

    async fn publish(&self, payload: &[u8]) -> ProviderResult<()> {
        self.state.record.lock().unwrap().published.push(PublishedMessage {
            topic: self.handle.topic.clone(),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn close(self: Box<Self>) -> ProviderResult<()> {
        self.state.record.lock().unwrap().closed.push(self.handle.clone());
        Ok(())
    }
}

struct MockSubscription {
    handle: OpenedHandle,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    state: Arc<MockState>,
}

#[async_trait]
impl Subscription for MockSubscription {
    fn topic(&self) -> &str {
        &self.handle.topic
    }

    async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    async fn close(self: Box<Self>) -> ProviderResult<()> {
        self.state.record.lock().unwrap().closed.push(self.handle.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_protocol::NatsSettings;

    fn settings() -> ProviderSettings {
        ProviderSettings::Nats(NatsSettings {
            server_url: "nats://mock".into(),
        })
    }

    #[tokio::test]
    async fn records_handles_and_publishes() {
        let mock = MockProvider::new(ProviderTag::Nats);
        let session = mock.open_session(&settings()).await.unwrap();
        let publisher = session.open_publisher("a/up", Qos::AtLeastOnce).await.unwrap();
        publisher.publish(b"hello").await.unwrap();
        publisher.close().await.unwrap();

        assert_eq!(mock.sessions_opened(), 1);
        assert_eq!(mock.published_to("a/up")[0].payload, b"hello");
        assert_eq!(mock.opened()[0].qos, Qos::AtLeastOnce);
        assert!(mock.leaked().is_empty());
    }

    #[tokio::test]
    async fn inject_reaches_subscription() {
        let mock = MockProvider::new(ProviderTag::Nats);
        let session = mock.open_session(&settings()).await.unwrap();
        let mut sub = session.open_subscription("a/down", Qos::AtMostOnce).await.unwrap();

        assert_eq!(mock.inject("a/down", b"one".to_vec()), 1);
        assert_eq!(mock.inject("a/other", b"two".to_vec()), 0);
        assert_eq!(sub.recv().await.unwrap(), b"one");

        mock.end_stream("a/down");
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn scripted_topic_failure_uses_ordinal() {
        let mock = MockProvider::new(ProviderTag::Nats).failing_topic_at(2);
        let session = mock.open_session(&settings()).await.unwrap();
        assert!(session.open_publisher("t/1", Qos::AtMostOnce).await.is_ok());
        assert!(matches!(
            session.open_subscription("t/2", Qos::AtMostOnce).await.err(),
            Some(ProviderError::Subscribe(_))
        ));
        assert_eq!(mock.opened().len(), 1);
    }

    #[tokio::test]
    async fn failing_disconnect_still_counts_close() {
        let mock = MockProvider::new(ProviderTag::Nats).failing_disconnect();
        let session = mock.open_session(&settings()).await.unwrap();
        assert!(session.close(Duration::from_secs(1)).await.is_err());
        assert_eq!(mock.sessions_closed(), 1);
    }
}
