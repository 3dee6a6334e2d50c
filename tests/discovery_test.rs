//! Plugin discovery: the one-shot registration pass, failure
//! accumulation with partial success, and provider reload.

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::StubProvider;
use omnivox::core::registry::PluginError;
use omnivox::{
    Capability, PluginRegistry, Provider, ProviderConfig, ProviderDiscovery, ProviderError,
    ProviderPlugin, ProviderRegistry, ProviderType,
};

/// A plugin that counts initializations and can be scripted to fail.
struct StubPlugin {
    name: String,
    fail_initialize: bool,
    initializations: Arc<AtomicUsize>,
}

impl StubPlugin {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail_initialize: false,
            initializations: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing(name: &str) -> Self {
        Self {
            fail_initialize: true,
            ..Self::new(name)
        }
    }
}

#[async_trait]
impl ProviderPlugin for StubPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Chat]
    }

    async fn initialize(
        &self,
        config: ProviderConfig,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        self.initializations.fetch_add(1, Ordering::SeqCst);
        if self.fail_initialize {
            return Err(ProviderError::Configuration(
                "scripted initialize failure".to_string(),
            ));
        }
        Ok(Arc::new(StubProvider::new(
            &config.name,
            vec![Capability::Chat],
        )))
    }
}

fn config_for(name: &str) -> ProviderConfig {
    ProviderConfig::new(name, ProviderType::Ai).with_api_key("key")
}

#[tokio::test]
async fn plugins_without_config_are_skipped() {
    let plugins = PluginRegistry::new();
    let configured = Arc::new(StubPlugin::new("configured"));
    let skipped = Arc::new(StubPlugin::new("skipped"));
    let skipped_count = skipped.initializations.clone();
    plugins.register_plugin(configured.clone()).unwrap();
    plugins.register_plugin(skipped).unwrap();

    let registry = ProviderRegistry::new();
    let mut configs = HashMap::new();
    configs.insert("configured".to_string(), config_for("configured"));

    plugins
        .discover_and_register(&configs, &registry)
        .await
        .unwrap();

    assert!(registry.get("configured", Capability::Chat).is_ok());
    assert_eq!(skipped_count.load(Ordering::SeqCst), 0);
    assert_eq!(configured.initializations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failures_are_collected_and_partial_successes_persist() {
    let plugins = PluginRegistry::new();
    plugins
        .register_plugin(Arc::new(StubPlugin::new("works")))
        .unwrap();
    plugins
        .register_plugin(Arc::new(StubPlugin::failing("broken")))
        .unwrap();

    let registry = ProviderRegistry::new();
    let mut configs = HashMap::new();
    configs.insert("works".to_string(), config_for("works"));
    configs.insert("broken".to_string(), config_for("broken"));

    let err = plugins
        .discover_and_register(&configs, &registry)
        .await
        .unwrap_err();
    assert_eq!(err.failures.len(), 1);
    assert!(err.to_string().contains("1 error(s)"));

    // The working provider survived the partial failure.
    assert!(registry.get("works", Capability::Chat).is_ok());
    assert!(registry.get("broken", Capability::Chat).is_err());
}

#[tokio::test]
async fn duplicate_and_empty_plugins_rejected() {
    let plugins = PluginRegistry::new();
    plugins
        .register_plugin(Arc::new(StubPlugin::new("dup")))
        .unwrap();
    assert!(matches!(
        plugins.register_plugin(Arc::new(StubPlugin::new("dup"))),
        Err(PluginError::Duplicate(_))
    ));
    assert!(matches!(
        plugins.register_plugin(Arc::new(StubPlugin::new(""))),
        Err(PluginError::EmptyName)
    ));
}

#[tokio::test]
async fn reload_replaces_the_registered_provider() {
    let plugins = Arc::new(PluginRegistry::new());
    let plugin = Arc::new(StubPlugin::new("svc"));
    let initializations = plugin.initializations.clone();
    plugins.register_plugin(plugin).unwrap();

    let registry = Arc::new(ProviderRegistry::new());
    let discovery = ProviderDiscovery::new(plugins, registry.clone());

    let mut configs = HashMap::new();
    configs.insert("svc".to_string(), config_for("svc"));
    discovery.load_providers(&configs).await.unwrap();
    assert_eq!(initializations.load(Ordering::SeqCst), 1);

    discovery
        .reload_provider("svc", config_for("svc"))
        .await
        .unwrap();
    assert_eq!(initializations.load(Ordering::SeqCst), 2);
    assert!(registry.get("svc", Capability::Chat).is_ok());

    // Reloading a name with no plugin is an error.
    assert!(discovery
        .reload_provider("ghost", config_for("ghost"))
        .await
        .is_err());
}

#[tokio::test]
async fn plugin_metadata_joins_registration_state() {
    let plugins = Arc::new(PluginRegistry::new());
    plugins
        .register_plugin(Arc::new(StubPlugin::new("svc")))
        .unwrap();
    let registry = Arc::new(ProviderRegistry::new());
    let discovery = ProviderDiscovery::new(plugins, registry);

    let before = discovery.plugin_metadata();
    assert_eq!(before.len(), 1);
    assert!(!before[0].available);

    let mut configs = HashMap::new();
    configs.insert("svc".to_string(), config_for("svc"));
    discovery.load_providers(&configs).await.unwrap();

    let after = discovery.plugin_metadata();
    assert!(after[0].available);
    assert_eq!(after[0].health_status, "unknown");
}
