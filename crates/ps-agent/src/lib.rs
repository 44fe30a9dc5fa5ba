//! Pub/sub agent: library crate for the integration runtime.
//!
//! Re-exports all modules so external crates (e.g. `ps-e2e-tests`) can
//! drive `Bridge` and `Integration` against a mock provider.

pub mod bridge;
pub mod config;
pub mod error;
pub mod integration;
pub mod uplinks;

pub use bridge::Bridge;
pub use config::AgentConfig;
pub use error::{AgentError, AgentResult};
pub use integration::{Integration, IntegrationEvent};
