use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::capability::Capability;

/// The kind of vendor backing a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Generic LLM vendor (chat / embedding).
    Ai,
    /// Generic speech vendor (STT / TTS).
    Speech,
    OpenAi,
    OpenRouter,
    Yandex,
    Minimax,
    Cartesia,
    Deepgram,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Ai => "ai",
            ProviderType::Speech => "speech",
            ProviderType::OpenAi => "openai",
            ProviderType::OpenRouter => "openrouter",
            ProviderType::Yandex => "yandex",
            ProviderType::Minimax => "minimax",
            ProviderType::Cartesia => "cartesia",
            ProviderType::Deepgram => "deepgram",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health status of a registered provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Pricing information for a model, per 1K tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_cost: f64,
    pub output_cost: f64,
    pub currency: String,
}

/// Information about a specific model offered by a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub capability: Option<Capability>,
    #[serde(default)]
    pub context_size: u32,
    #[serde(default)]
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<ModelPricing>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

/// Describing metadata for a registered provider.
///
/// Owned and mutated only by the registry; readers get a deep copy so
/// internal state is never aliased out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub capabilities: Vec<Capability>,
    /// Per-capability model catalogs.
    pub models: HashMap<Capability, Vec<Model>>,
    pub available: bool,
    pub health_status: HealthStatus,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
    pub last_checked: Option<SystemTime>,
}

impl ProviderInfo {
    pub fn new(name: &str, provider_type: ProviderType, capabilities: Vec<Capability>) -> Self {
        Self {
            name: name.to_string(),
            provider_type,
            version: String::new(),
            description: String::new(),
            capabilities,
            models: HashMap::new(),
            available: false,
            health_status: HealthStatus::Unknown,
            metadata: HashMap::new(),
            last_checked: None,
        }
    }

    pub fn add_model(&mut self, capability: Capability, model: Model) {
        self.models.entry(capability).or_default().push(model);
    }

    pub fn models_for(&self, capability: Capability) -> &[Model] {
        self.models.get(&capability).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Updates the health status and the last-checked timestamp together.
    pub fn update_health_status(&mut self, status: HealthStatus) {
        self.health_status = status;
        self.last_checked = Some(SystemTime::now());
    }

    pub fn is_available(&self) -> bool {
        self.available
            && matches!(
                self.health_status,
                HealthStatus::Healthy | HealthStatus::Degraded
            )
    }
}

/// Retry behavior for provider calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(default)]
    pub initial_delay_ms: u64,
    #[serde(default)]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff")]
    pub backoff_factor: f64,
    #[serde(default)]
    pub retryable_errors: Vec<String>,
}

fn default_backoff() -> f64 {
    2.0
}

impl RetryPolicy {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Default request timeout applied when a provider config does not set one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a single provider, immutable after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Canonical name; filled from the config map key when omitted.
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    #[serde(default)]
    pub api_key: String,
    /// Optional base URL / endpoint override; defaults are per provider.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Default model identifier.
    #[serde(default)]
    pub model: String,
    /// Provider-specific options; recognized keys are translated into a
    /// typed per-provider record at initialize time, unknown keys rejected.
    #[serde(default)]
    pub options: HashMap<String, Value>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ProviderConfig {
    pub fn new(name: &str, provider_type: ProviderType) -> Self {
        Self {
            name: name.to_string(),
            provider_type,
            api_key: String::new(),
            base_url: None,
            model: String::new(),
            options: HashMap::new(),
            timeout_secs: None,
            retry_policy: None,
            enabled: true,
        }
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = api_key.to_string();
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.to_string());
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_option(mut self, key: &str, value: Value) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_info_model_catalog() {
        let mut info = ProviderInfo::new("deepgram", ProviderType::Deepgram, vec![Capability::Stt]);
        info.add_model(
            Capability::Stt,
            Model {
                id: "nova-3".to_string(),
                name: "Nova 3".to_string(),
                ..Default::default()
            },
        );

        assert_eq!(info.models_for(Capability::Stt).len(), 1);
        assert!(info.models_for(Capability::Tts).is_empty());
        assert!(info.has_capability(Capability::Stt));
        assert!(!info.has_capability(Capability::Chat));
    }

    #[test]
    fn availability_requires_health() {
        let mut info = ProviderInfo::new("x", ProviderType::Ai, vec![Capability::Chat]);
        info.available = true;
        assert!(!info.is_available());

        info.update_health_status(HealthStatus::Healthy);
        assert!(info.is_available());
        assert!(info.last_checked.is_some());

        info.update_health_status(HealthStatus::Unhealthy);
        assert!(!info.is_available());
    }

    #[test]
    fn config_timeout_default() {
        let config = ProviderConfig::new("openai", ProviderType::OpenAi);
        assert_eq!(config.timeout(), DEFAULT_REQUEST_TIMEOUT);

        let config = ProviderConfig {
            timeout_secs: Some(5),
            ..config
        };
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }
}
