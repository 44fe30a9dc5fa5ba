//! Backend provider capability.
//!
//! Each backend technology implements [`Provider`]; everything the
//! connection core needs from a backend is "open a session, derive a
//! publisher or subscription per topic, close the session". Timeouts and
//! cancellation are applied by [`Connection`](crate::Connection) around
//! these futures.

use std::time::Duration;

use async_trait::async_trait;
use ps_protocol::{ProviderSettings, ProviderTag, Qos};

use crate::error::ProviderResult;

/// One backend technology.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Backend tag this provider serves.
    fn tag(&self) -> ProviderTag;

    /// Establish a backend session.
    ///
    /// The returned future may be dropped before completion (timeout or
    /// cancellation); implementations must not leave a live connection
    /// behind in that case.
    async fn open_session(&self, settings: &ProviderSettings) -> ProviderResult<Box<dyn Session>>;
}

/// An open backend session from which topic handles are derived.
#[async_trait]
pub trait Session: Send + Sync {
    /// Open a handle that publishes to `topic`.
    async fn open_publisher(&self, topic: &str, qos: Qos) -> ProviderResult<Box<dyn Publisher>>;

    /// Open a subscription on `topic`.
    async fn open_subscription(
        &self,
        topic: &str,
        qos: Qos,
    ) -> ProviderResult<Box<dyn Subscription>>;

    /// Gracefully close the session, waiting at most `timeout`.
    async fn close(self: Box<Self>, timeout: Duration) -> ProviderResult<()>;
}

/// Publishes byte payloads to one topic. Safe to share between tasks.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn topic(&self) -> &str;

    async fn publish(&self, payload: &[u8]) -> ProviderResult<()>;

    async fn close(self: Box<Self>) -> ProviderResult<()>;
}

/// Single-consumer stream of payloads received on one topic.
#[async_trait]
pub trait Subscription: Send + Sync {
    fn topic(&self) -> &str;

    /// Next received payload; `None` once the backend ends the stream.
    /// Restart by opening a new subscription.
    async fn recv(&mut self) -> Option<Vec<u8>>;

    async fn close(self: Box<Self>) -> ProviderResult<()>;
}
