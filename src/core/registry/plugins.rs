//! Plugin registry and the one-shot discovery pass that instantiates
//! every configured plugin and installs the resulting providers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::core::capability::Capability;
use crate::core::error::ProviderError;
use crate::core::models::ProviderConfig;
use crate::core::registry::ProviderRegistry;
use crate::core::services::Provider;

/// A factory that, given a config, produces an initialized provider.
#[async_trait]
pub trait ProviderPlugin: Send + Sync {
    /// Unique identifier; matched against config keys during discovery.
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Capabilities the produced provider will declare.
    fn capabilities(&self) -> Vec<Capability>;

    /// Additional descriptive metadata.
    fn metadata(&self) -> HashMap<String, Value> {
        HashMap::new()
    }

    /// Builds and initializes a provider from the given config.
    async fn initialize(&self, config: ProviderConfig)
        -> Result<Arc<dyn Provider>, ProviderError>;
}

/// Errors from plugin registration and lookup.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("plugin name cannot be empty")]
    EmptyName,

    #[error("plugin {0} must support at least one capability")]
    NoCapabilities(String),

    #[error("plugin {0} is already registered")]
    Duplicate(String),

    #[error("plugin {0} not found")]
    NotFound(String),
}

/// Error summarizing a discovery pass with one or more failures; partial
/// successes persist in the provider registry. Individual failures are
/// in `failures` as `(plugin name, message)` pairs.
#[derive(Debug, thiserror::Error)]
#[error("plugin discovery encountered {} error(s)", .failures.len())]
pub struct DiscoveryError {
    pub failures: Vec<(String, String)>,
}

/// Descriptive metadata about a plugin, optionally joined with the live
/// registration state of its provider.
#[derive(Debug, Clone, Serialize)]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
    pub capabilities: Vec<Capability>,
    pub available: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub health_status: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

/// Name → factory table for provider plugins.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, Arc<dyn ProviderPlugin>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_plugin(&self, plugin: Arc<dyn ProviderPlugin>) -> Result<(), PluginError> {
        let name = plugin.name().to_string();
        if name.is_empty() {
            return Err(PluginError::EmptyName);
        }
        if plugin.capabilities().is_empty() {
            return Err(PluginError::NoCapabilities(name));
        }

        let mut plugins = self.plugins.write();
        if plugins.contains_key(&name) {
            return Err(PluginError::Duplicate(name));
        }
        plugins.insert(name, plugin);
        Ok(())
    }

    pub fn get_plugin(&self, name: &str) -> Result<Arc<dyn ProviderPlugin>, PluginError> {
        self.plugins
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PluginError::NotFound(name.to_string()))
    }

    pub fn list_plugins(&self) -> Vec<Arc<dyn ProviderPlugin>> {
        self.plugins.read().values().cloned().collect()
    }

    pub fn unregister_plugin(&self, name: &str) -> Result<(), PluginError> {
        self.plugins
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PluginError::NotFound(name.to_string()))
    }

    /// Runs one registration pass: for every plugin with a matching
    /// config, initialize it and register the provider. Plugins without a
    /// config are skipped. Failures are collected; a provider that fails
    /// to register is closed to avoid leaking its transport.
    pub async fn discover_and_register(
        &self,
        configs: &HashMap<String, ProviderConfig>,
        registry: &ProviderRegistry,
    ) -> Result<(), DiscoveryError> {
        let plugins: Vec<Arc<dyn ProviderPlugin>> = self.list_plugins();
        let mut failures = Vec::new();

        for plugin in plugins {
            let name = plugin.name().to_string();
            let Some(config) = configs.get(&name) else {
                continue;
            };

            let provider = match plugin.initialize(config.clone()).await {
                Ok(provider) => provider,
                Err(err) => {
                    warn!(plugin = %name, error = %err, "failed to initialize plugin");
                    failures.push((name, format!("failed to initialize plugin: {err}")));
                    continue;
                }
            };

            if let Err(err) = registry.register(provider.clone()) {
                warn!(plugin = %name, error = %err, "failed to register provider");
                failures.push((name, format!("failed to register provider: {err}")));
                let _ = provider.close().await;
                continue;
            }

            info!(plugin = %name, "provider registered");
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DiscoveryError { failures })
        }
    }
}

/// Utility joining the plugin registry and the provider registry for
/// loading and reloading providers.
pub struct ProviderDiscovery {
    plugins: Arc<PluginRegistry>,
    providers: Arc<ProviderRegistry>,
}

impl ProviderDiscovery {
    pub fn new(plugins: Arc<PluginRegistry>, providers: Arc<ProviderRegistry>) -> Self {
        Self { plugins, providers }
    }

    /// Loads and registers all configured providers.
    pub async fn load_providers(
        &self,
        configs: &HashMap<String, ProviderConfig>,
    ) -> Result<(), DiscoveryError> {
        self.plugins
            .discover_and_register(configs, &self.providers)
            .await
    }

    /// Reloads a provider with a new config: unregisters the existing one
    /// (ignoring missing), initializes a fresh provider, and registers
    /// it. The factory's handle cache for this name is not touched here;
    /// callers that hold a factory must invalidate it themselves.
    pub async fn reload_provider(
        &self,
        name: &str,
        config: ProviderConfig,
    ) -> Result<(), ProviderError> {
        let plugin = self
            .plugins
            .get_plugin(name)
            .map_err(|e| ProviderError::Configuration(format!("plugin not found: {e}")))?;

        let _ = self.providers.unregister(name).await;

        let provider = plugin.initialize(config).await?;
        if let Err(err) = self.providers.register(provider.clone()) {
            let _ = provider.close().await;
            return Err(ProviderError::Configuration(format!(
                "failed to register provider: {err}"
            )));
        }
        Ok(())
    }

    /// Metadata for all known plugins, joined with live registration
    /// state where available.
    pub fn plugin_metadata(&self) -> Vec<PluginMetadata> {
        self.plugins
            .list_plugins()
            .into_iter()
            .map(|plugin| {
                let mut meta = PluginMetadata {
                    name: plugin.name().to_string(),
                    version: plugin.version().to_string(),
                    capabilities: plugin.capabilities(),
                    available: false,
                    health_status: String::new(),
                    metadata: plugin.metadata(),
                };
                if let Ok(info) = self.providers.provider_info(plugin.name()) {
                    meta.available = info.available;
                    meta.health_status = info.health_status.to_string();
                }
                meta
            })
            .collect()
    }
}

/// Filters provider configs before construction with inclusion and
/// exclusion lists: a name is loaded iff it is not disabled and either
/// the enabled list is empty or contains the name.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryConfig {
    pub provider_configs: HashMap<String, ProviderConfig>,
    pub enabled_providers: Vec<String>,
    pub disabled_providers: Vec<String>,
}

impl DiscoveryConfig {
    pub fn should_load_provider(&self, name: &str) -> bool {
        if self.disabled_providers.iter().any(|d| d == name) {
            return false;
        }
        if self.enabled_providers.is_empty() {
            return true;
        }
        self.enabled_providers.iter().any(|e| e == name)
    }

    /// The effective config set after applying the lists.
    pub fn filter_configs(&self) -> HashMap<String, ProviderConfig> {
        self.provider_configs
            .iter()
            .filter(|(name, _)| self.should_load_provider(name))
            .map(|(name, config)| (name.clone(), config.clone()))
            .collect()
    }
}
