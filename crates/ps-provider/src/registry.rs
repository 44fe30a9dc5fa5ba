//! Provider registry: backend tag → provider.
//!
//! Built once at startup with [`ProviderRegistry::register`], then frozen
//! (either owned by the caller or installed process-wide with [`install`]).
//! Resolution only reads, so concurrent lookups need no lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use ps_protocol::{PubSubDescriptor, ProviderTag};

use crate::error::{ProviderError, ProviderResult};
use crate::mqtt::MqttProvider;
use crate::provider::Provider;

#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderTag, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every provider this crate ships (MQTT).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.providers.insert(ProviderTag::Mqtt, Arc::new(MqttProvider::new()));
        registry
    }

    /// Install `provider` for `tag`. Registering a tag twice is a startup
    /// configuration error.
    pub fn register(&mut self, tag: ProviderTag, provider: Arc<dyn Provider>) -> ProviderResult<()> {
        if self.providers.contains_key(&tag) {
            return Err(ProviderError::DuplicateProvider(tag));
        }
        self.providers.insert(tag, provider);
        Ok(())
    }

    /// Provider for the backend `descriptor` selects.
    pub fn resolve(&self, descriptor: &PubSubDescriptor) -> ProviderResult<Arc<dyn Provider>> {
        self.get(descriptor.provider_tag())
    }

    pub fn get(&self, tag: ProviderTag) -> ProviderResult<Arc<dyn Provider>> {
        self.providers
            .get(&tag)
            .cloned()
            .ok_or(ProviderError::UnsupportedBackend(tag))
    }

    pub fn tags(&self) -> Vec<ProviderTag> {
        self.providers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

// ── Process-wide registry ─────────────────────────────────────

static GLOBAL: OnceLock<ProviderRegistry> = OnceLock::new();

/// Freeze `registry` as the process-wide registry. Must run during startup,
/// before the first [`global`] call.
pub fn install(registry: ProviderRegistry) -> ProviderResult<&'static ProviderRegistry> {
    GLOBAL
        .set(registry)
        .map_err(|_| ProviderError::RegistryInstalled)?;
    Ok(global())
}

/// The process-wide registry; empty if nothing was installed.
pub fn global() -> &'static ProviderRegistry {
    GLOBAL.get_or_init(ProviderRegistry::new)
}
