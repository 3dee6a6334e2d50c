//! Provider registry: the single source of truth for registered
//! providers, their capability index, and their health state.

mod plugins;

pub use plugins::{
    DiscoveryConfig, DiscoveryError, PluginError, PluginMetadata, PluginRegistry,
    ProviderDiscovery, ProviderPlugin,
};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::core::capability::Capability;
use crate::core::error::ProviderError;
use crate::core::models::{HealthStatus, ProviderInfo};
use crate::core::services::Provider;

/// Per-provider deadline for health probes.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from registry operations. Every invariant violation maps to a
/// distinct variant so the factory's fallback wrapper can decide whether
/// to retry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("provider name cannot be empty")]
    EmptyName,

    #[error("provider {0} must support at least one capability")]
    NoCapabilities(String),

    #[error("provider {0} is already registered")]
    Duplicate(String),

    #[error("provider {0} not found")]
    NotFound(String),

    #[error("provider {0} does not support capability {1}")]
    MissingCapability(String, Capability),

    #[error("provider {0} is currently unhealthy")]
    Unhealthy(String),

    /// `Unregister` removed the provider but its `close` failed; the
    /// provider is gone from the registry regardless.
    #[error("failed to close provider {name}: {source}")]
    Close {
        name: String,
        #[source]
        source: ProviderError,
    },
}

#[derive(Default)]
struct RegistryInner {
    providers: HashMap<String, Arc<dyn Provider>>,
    /// capability -> provider names in registration order, so deterministic
    /// iteration can feed round-robin policies.
    capability_index: HashMap<Capability, Vec<String>>,
    info: HashMap<String, ProviderInfo>,
    health: HashMap<String, HealthStatus>,
    last_checked: HashMap<String, Option<SystemTime>>,
}

/// Thread-safe registry of live providers.
///
/// All mutations serialize under a single reader-preferring lock; read
/// paths never block each other. The lock is never held across a provider
/// method call.
#[derive(Default)]
pub struct ProviderRegistry {
    inner: RwLock<RegistryInner>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider. Fails on empty name, empty capability set,
    /// or duplicate name; the capability index preserves registration
    /// order.
    pub fn register(&self, provider: Arc<dyn Provider>) -> Result<(), RegistryError> {
        let name = provider.name().to_string();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let capabilities = provider.capabilities();
        if capabilities.is_empty() {
            return Err(RegistryError::NoCapabilities(name));
        }

        let mut inner = self.inner.write();
        if inner.providers.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }

        for capability in &capabilities {
            inner
                .capability_index
                .entry(*capability)
                .or_default()
                .push(name.clone());
        }

        let mut info = ProviderInfo::new(&name, provider.provider_type(), capabilities);
        info.available = true;
        info.health_status = HealthStatus::Unknown;
        inner.info.insert(name.clone(), info);
        inner.health.insert(name.clone(), HealthStatus::Unknown);
        inner.last_checked.insert(name.clone(), None);
        inner.providers.insert(name.clone(), provider);

        debug!(provider = %name, "registered provider");
        Ok(())
    }

    /// Removes a provider and closes it. The entry is removed even when
    /// `close` fails; the close error is still returned.
    pub async fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        let provider = {
            let mut inner = self.inner.write();
            let provider = inner
                .providers
                .remove(name)
                .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

            for capability in provider.capabilities() {
                if let Some(names) = inner.capability_index.get_mut(&capability) {
                    names.retain(|n| n != name);
                    if names.is_empty() {
                        inner.capability_index.remove(&capability);
                    }
                }
            }
            inner.info.remove(name);
            inner.health.remove(name);
            inner.last_checked.remove(name);
            provider
        };

        debug!(provider = %name, "unregistered provider");
        provider.close().await.map_err(|source| RegistryError::Close {
            name: name.to_string(),
            source,
        })
    }

    /// Returns the provider handle if it exists, declares the capability,
    /// and is not currently unhealthy.
    pub fn get(
        &self,
        name: &str,
        capability: Capability,
    ) -> Result<Arc<dyn Provider>, RegistryError> {
        let inner = self.inner.read();
        let provider = inner
            .providers
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        if !provider.capabilities().contains(&capability) {
            return Err(RegistryError::MissingCapability(
                name.to_string(),
                capability,
            ));
        }

        if inner.health.get(name) == Some(&HealthStatus::Unhealthy) {
            return Err(RegistryError::Unhealthy(name.to_string()));
        }

        Ok(provider.clone())
    }

    /// Provider handles for a capability, in registration order.
    pub fn list(&self, capability: Capability) -> Vec<Arc<dyn Provider>> {
        let inner = self.inner.read();
        let Some(names) = inner.capability_index.get(&capability) else {
            return Vec::new();
        };
        names
            .iter()
            .filter_map(|name| inner.providers.get(name).cloned())
            .collect()
    }

    /// All registered provider handles.
    pub fn list_all(&self) -> Vec<Arc<dyn Provider>> {
        self.inner.read().providers.values().cloned().collect()
    }

    /// Like [`list`](Self::list), filtering out providers that are
    /// unhealthy or have no health status.
    pub fn available_providers(&self, capability: Capability) -> Vec<Arc<dyn Provider>> {
        let inner = self.inner.read();
        let Some(names) = inner.capability_index.get(&capability) else {
            return Vec::new();
        };
        names
            .iter()
            .filter(|name| {
                matches!(
                    inner.health.get(name.as_str()),
                    Some(HealthStatus::Healthy)
                        | Some(HealthStatus::Degraded)
                        | Some(HealthStatus::Unknown)
                )
            })
            .filter_map(|name| inner.providers.get(name).cloned())
            .collect()
    }

    /// Returns a deep copy of a provider's metadata; mutating it has no
    /// effect on registry state.
    pub fn provider_info(&self, name: &str) -> Result<ProviderInfo, RegistryError> {
        self.inner
            .read()
            .info
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Current health status of a provider, if registered.
    pub fn health_status(&self, name: &str) -> Option<HealthStatus> {
        self.inner.read().health.get(name).copied()
    }

    /// Probes every registered provider concurrently, one task per
    /// provider with an independent [`HEALTH_CHECK_TIMEOUT`] deadline.
    /// Health, availability, and last-checked are updated atomically per
    /// result; ordering between probes is not guaranteed.
    pub async fn health_check(&self) -> HashMap<String, Result<(), ProviderError>> {
        let snapshot: Vec<(String, Arc<dyn Provider>)> = {
            let inner = self.inner.read();
            inner
                .providers
                .iter()
                .map(|(name, provider)| (name.clone(), provider.clone()))
                .collect()
        };

        let mut probes = JoinSet::new();
        for (name, provider) in snapshot {
            probes.spawn(async move {
                let result =
                    match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, provider.health_check()).await
                    {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::Timeout(format!(
                            "health check exceeded {}s",
                            HEALTH_CHECK_TIMEOUT.as_secs()
                        ))),
                    };
                (name, result)
            });
        }

        let mut results = HashMap::new();
        while let Some(joined) = probes.join_next().await {
            let Ok((name, result)) = joined else {
                warn!("health probe task failed to join");
                continue;
            };

            {
                let mut inner = self.inner.write();
                let status = if result.is_ok() {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Unhealthy
                };
                inner.health.insert(name.clone(), status);
                inner
                    .last_checked
                    .insert(name.clone(), Some(SystemTime::now()));
                if let Some(info) = inner.info.get_mut(&name) {
                    info.update_health_status(status);
                    info.available = result.is_ok();
                }
            }

            if let Err(err) = &result {
                warn!(provider = %name, error = %err, "provider health check failed");
            } else {
                debug!(provider = %name, "provider healthy");
            }
            results.insert(name, result);
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ProviderType;
    use async_trait::async_trait;

    struct StubProvider {
        name: String,
        capabilities: Vec<Capability>,
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn provider_type(&self) -> ProviderType {
            ProviderType::Ai
        }

        fn capabilities(&self) -> Vec<Capability> {
            self.capabilities.clone()
        }

        async fn health_check(&self) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    fn stub(name: &str, capabilities: Vec<Capability>) -> Arc<dyn Provider> {
        Arc::new(StubProvider {
            name: name.to_string(),
            capabilities,
        })
    }

    #[test]
    fn rejects_empty_name_and_capabilities() {
        let registry = ProviderRegistry::new();
        assert!(matches!(
            registry.register(stub("", vec![Capability::Chat])),
            Err(RegistryError::EmptyName)
        ));
        assert!(matches!(
            registry.register(stub("x", vec![])),
            Err(RegistryError::NoCapabilities(_))
        ));
    }

    #[test]
    fn get_checks_capability() {
        let registry = ProviderRegistry::new();
        registry.register(stub("a", vec![Capability::Chat])).unwrap();

        assert!(registry.get("a", Capability::Chat).is_ok());
        assert!(matches!(
            registry.get("a", Capability::Tts),
            Err(RegistryError::MissingCapability(_, Capability::Tts))
        ));
        assert!(matches!(
            registry.get("b", Capability::Chat),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn list_preserves_registration_order() {
        let registry = ProviderRegistry::new();
        registry.register(stub("first", vec![Capability::Stt])).unwrap();
        registry.register(stub("second", vec![Capability::Stt])).unwrap();

        let names: Vec<String> = registry
            .list(Capability::Stt)
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }
}
