//! Capability-typed resolution over the registry, with a memoized
//! handle cache and an optional fallback wrapper.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::capability::Capability;
use crate::core::registry::{ProviderRegistry, RegistryError};
use crate::core::services::{ChatService, EmbeddingService, SttService, TtsService};

/// Errors from capability-typed resolution.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    /// The registry refused the lookup (unknown name, missing
    /// capability, unhealthy).
    #[error("failed to get {capability} provider {name}: {source}")]
    Resolution {
        name: String,
        capability: Capability,
        #[source]
        source: RegistryError,
    },

    /// The provider is registered with the capability but its handle does
    /// not expose the matching service interface.
    #[error("provider {0} does not implement the {1} service interface")]
    InterfaceNotSupported(String, Capability),
}

/// Supplies the substitute provider name consulted by the fallback
/// wrapper. No retry chains: one substitute per capability.
pub trait FallbackPolicy: Send + Sync {
    fn fallback_provider(&self, capability: Capability) -> Option<String>;
}

#[derive(Clone)]
enum CachedService {
    Chat(Arc<dyn ChatService>),
    Embedding(Arc<dyn EmbeddingService>),
    Stt(Arc<dyn SttService>),
    Tts(Arc<dyn TtsService>),
}

fn cache_key(capability: Capability, name: &str) -> String {
    format!("{capability}:{name}")
}

/// Resolves `(capability, provider-name)` pairs to capability-specific
/// handles, memoizing the result keyed by `capability:name`.
pub struct ProviderFactory {
    registry: Arc<ProviderRegistry>,
    cache: Mutex<HashMap<String, CachedService>>,
    /// Per-name initialization locks: at most one concurrent
    /// construction per provider name.
    init_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ProviderFactory {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            cache: Mutex::new(HashMap::new()),
            init_locks: Mutex::new(HashMap::new()),
        }
    }

    fn init_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.init_locks
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn cached(&self, key: &str) -> Option<CachedService> {
        self.cache.lock().get(key).cloned()
    }

    fn set_cached(&self, key: String, service: CachedService) {
        self.cache.lock().insert(key, service);
    }

    pub async fn create_chat_service(
        &self,
        provider_name: &str,
    ) -> Result<Arc<dyn ChatService>, FactoryError> {
        let key = cache_key(Capability::Chat, provider_name);
        if let Some(CachedService::Chat(service)) = self.cached(&key) {
            return Ok(service);
        }

        let lock = self.init_lock(provider_name);
        let _guard = lock.lock().await;
        if let Some(CachedService::Chat(service)) = self.cached(&key) {
            return Ok(service);
        }

        let provider = self.resolve(provider_name, Capability::Chat)?;
        let service = provider.chat().ok_or_else(|| {
            FactoryError::InterfaceNotSupported(provider_name.to_string(), Capability::Chat)
        })?;
        self.set_cached(key, CachedService::Chat(service.clone()));
        Ok(service)
    }

    pub async fn create_embedding_service(
        &self,
        provider_name: &str,
    ) -> Result<Arc<dyn EmbeddingService>, FactoryError> {
        let key = cache_key(Capability::Embedding, provider_name);
        if let Some(CachedService::Embedding(service)) = self.cached(&key) {
            return Ok(service);
        }

        let lock = self.init_lock(provider_name);
        let _guard = lock.lock().await;
        if let Some(CachedService::Embedding(service)) = self.cached(&key) {
            return Ok(service);
        }

        let provider = self.resolve(provider_name, Capability::Embedding)?;
        let service = provider.embedding().ok_or_else(|| {
            FactoryError::InterfaceNotSupported(provider_name.to_string(), Capability::Embedding)
        })?;
        self.set_cached(key, CachedService::Embedding(service.clone()));
        Ok(service)
    }

    pub async fn create_stt_service(
        &self,
        provider_name: &str,
    ) -> Result<Arc<dyn SttService>, FactoryError> {
        let key = cache_key(Capability::Stt, provider_name);
        if let Some(CachedService::Stt(service)) = self.cached(&key) {
            return Ok(service);
        }

        let lock = self.init_lock(provider_name);
        let _guard = lock.lock().await;
        if let Some(CachedService::Stt(service)) = self.cached(&key) {
            return Ok(service);
        }

        let provider = self.resolve(provider_name, Capability::Stt)?;
        let service = provider.stt().ok_or_else(|| {
            FactoryError::InterfaceNotSupported(provider_name.to_string(), Capability::Stt)
        })?;
        self.set_cached(key, CachedService::Stt(service.clone()));
        Ok(service)
    }

    pub async fn create_tts_service(
        &self,
        provider_name: &str,
    ) -> Result<Arc<dyn TtsService>, FactoryError> {
        let key = cache_key(Capability::Tts, provider_name);
        if let Some(CachedService::Tts(service)) = self.cached(&key) {
            return Ok(service);
        }

        let lock = self.init_lock(provider_name);
        let _guard = lock.lock().await;
        if let Some(CachedService::Tts(service)) = self.cached(&key) {
            return Ok(service);
        }

        let provider = self.resolve(provider_name, Capability::Tts)?;
        let service = provider.tts().ok_or_else(|| {
            FactoryError::InterfaceNotSupported(provider_name.to_string(), Capability::Tts)
        })?;
        self.set_cached(key, CachedService::Tts(service.clone()));
        Ok(service)
    }

    fn resolve(
        &self,
        name: &str,
        capability: Capability,
    ) -> Result<Arc<dyn crate::core::services::Provider>, FactoryError> {
        self.registry
            .get(name, capability)
            .map_err(|source| FactoryError::Resolution {
                name: name.to_string(),
                capability,
                source,
            })
    }

    /// Drops every cached handle.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Invalidates all four capability entries for one provider name.
    /// Must be called explicitly after unregistering a provider; the
    /// registry does not call back into the factory.
    pub fn clear_cache_for_provider(&self, provider_name: &str) {
        let mut cache = self.cache.lock();
        for capability in Capability::ALL {
            cache.remove(&cache_key(capability, provider_name));
        }
    }
}

/// Wraps a [`ProviderFactory`] with single-step fallback: on failure the
/// policy is consulted for a substitute name and the lookup retried once.
/// If the fallback also fails, the primary's error is surfaced.
pub struct FallbackFactory {
    factory: Arc<ProviderFactory>,
    policy: Arc<dyn FallbackPolicy>,
}

impl FallbackFactory {
    pub fn new(factory: Arc<ProviderFactory>, policy: Arc<dyn FallbackPolicy>) -> Self {
        Self { factory, policy }
    }

    fn fallback_for(&self, capability: Capability, primary: &str) -> Option<String> {
        let fallback = self.policy.fallback_provider(capability)?;
        if fallback.is_empty() || fallback == primary {
            return None;
        }
        Some(fallback)
    }

    pub async fn create_chat_service(
        &self,
        provider_name: &str,
    ) -> Result<Arc<dyn ChatService>, FactoryError> {
        match self.factory.create_chat_service(provider_name).await {
            Ok(service) => Ok(service),
            Err(primary_err) => {
                let Some(fallback) = self.fallback_for(Capability::Chat, provider_name) else {
                    return Err(primary_err);
                };
                warn!(primary = %provider_name, fallback = %fallback, "chat provider failed, trying fallback");
                match self.factory.create_chat_service(&fallback).await {
                    Ok(service) => Ok(service),
                    Err(fallback_err) => {
                        debug!(error = %fallback_err, "fallback provider also failed");
                        Err(primary_err)
                    }
                }
            }
        }
    }

    pub async fn create_embedding_service(
        &self,
        provider_name: &str,
    ) -> Result<Arc<dyn EmbeddingService>, FactoryError> {
        match self.factory.create_embedding_service(provider_name).await {
            Ok(service) => Ok(service),
            Err(primary_err) => {
                let Some(fallback) = self.fallback_for(Capability::Embedding, provider_name)
                else {
                    return Err(primary_err);
                };
                warn!(primary = %provider_name, fallback = %fallback, "embedding provider failed, trying fallback");
                match self.factory.create_embedding_service(&fallback).await {
                    Ok(service) => Ok(service),
                    Err(fallback_err) => {
                        debug!(error = %fallback_err, "fallback provider also failed");
                        Err(primary_err)
                    }
                }
            }
        }
    }

    pub async fn create_stt_service(
        &self,
        provider_name: &str,
    ) -> Result<Arc<dyn SttService>, FactoryError> {
        match self.factory.create_stt_service(provider_name).await {
            Ok(service) => Ok(service),
            Err(primary_err) => {
                let Some(fallback) = self.fallback_for(Capability::Stt, provider_name) else {
                    return Err(primary_err);
                };
                warn!(primary = %provider_name, fallback = %fallback, "STT provider failed, trying fallback");
                match self.factory.create_stt_service(&fallback).await {
                    Ok(service) => Ok(service),
                    Err(fallback_err) => {
                        debug!(error = %fallback_err, "fallback provider also failed");
                        Err(primary_err)
                    }
                }
            }
        }
    }

    pub async fn create_tts_service(
        &self,
        provider_name: &str,
    ) -> Result<Arc<dyn TtsService>, FactoryError> {
        match self.factory.create_tts_service(provider_name).await {
            Ok(service) => Ok(service),
            Err(primary_err) => {
                let Some(fallback) = self.fallback_for(Capability::Tts, provider_name) else {
                    return Err(primary_err);
                };
                warn!(primary = %provider_name, fallback = %fallback, "TTS provider failed, trying fallback");
                match self.factory.create_tts_service(&fallback).await {
                    Ok(service) => Ok(service),
                    Err(fallback_err) => {
                        debug!(error = %fallback_err, "fallback provider also failed");
                        Err(primary_err)
                    }
                }
            }
        }
    }

    pub fn clear_cache(&self) {
        self.factory.clear_cache();
    }

    pub fn clear_cache_for_provider(&self, provider_name: &str) {
        self.factory.clear_cache_for_provider(provider_name);
    }
}
