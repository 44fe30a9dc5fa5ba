//! Pub/sub provider connections.
//!
//! Backend-agnostic connection core for application pub/sub integrations:
//! - `Provider` / `Session` / `Publisher` / `Subscription` traits (mockable)
//! - `ProviderRegistry` mapping backend tags to providers
//! - `Connection` with all-or-nothing open, timeouts and cancellation
//! - `MqttProvider` over rumqttc, with optional TLS
//! - `MockProvider` for testing without a broker

pub mod connection;
pub mod error;
pub mod mock;
pub mod mqtt;
pub mod provider;
pub mod registry;
pub mod tls;

// Re-exports for convenience.
pub use connection::{
    CancelHandle, CancelSignal, ConnectOptions, Connection, DEFAULT_TIMEOUT, cancel_pair,
};
pub use error::{ProviderError, ProviderResult};
pub use mock::MockProvider;
pub use mqtt::MqttProvider;
pub use provider::{Provider, Publisher, Session, Subscription};
pub use registry::{ProviderRegistry, global, install};
