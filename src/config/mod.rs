//! Gateway configuration.
//!
//! Configuration is loaded from a YAML file, overlaid with environment
//! variables, or built from the environment alone. Dotted config keys
//! map to underscore-separated environment variables under a
//! configurable prefix: with prefix `OMNIVOX`,
//! `providers.openai.api_key` becomes `OMNIVOX_PROVIDERS_OPENAI_API_KEY`.
//!
//! # Example
//!
//! ```rust,no_run
//! use omnivox::config::GatewayConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::from_file("gateway.yaml", "OMNIVOX")?;
//! println!("{} providers configured", config.providers.len());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::capability::Capability;
use crate::core::factory::FallbackPolicy;
use crate::core::models::{ProviderConfig, ProviderType};
use crate::core::registry::DiscoveryConfig;

/// Errors from configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Logging settings consumed by [`crate::init::init_logging`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `json` (default) or `console`.
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub environment: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            service_name: String::new(),
            environment: String::new(),
        }
    }
}

/// Supabase connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupabaseSettings {
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub log: LogSettings,
    /// Provider name → provider record.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Capability name → fallback provider name.
    #[serde(default)]
    pub fallbacks: HashMap<String, String>,
    #[serde(default)]
    pub enabled_providers: Vec<String>,
    #[serde(default)]
    pub disabled_providers: Vec<String>,
    #[serde(default)]
    pub supabase: Option<SupabaseSettings>,
}

/// Maps a dotted config key to its environment variable name under a
/// prefix: `env_key("OMNIVOX", "providers.openai.api_key")` →
/// `OMNIVOX_PROVIDERS_OPENAI_API_KEY`.
pub fn env_key(prefix: &str, key: &str) -> String {
    let mapped: String = key
        .chars()
        .map(|c| match c {
            '.' | '-' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect();
    if prefix.is_empty() {
        mapped
    } else {
        format!("{prefix}_{mapped}")
    }
}

fn env_var(prefix: &str, key: &str) -> Option<String> {
    env::var(env_key(prefix, key)).ok().filter(|v| !v.is_empty())
}

fn parse_provider_type(value: &str) -> Result<ProviderType, ConfigError> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).map_err(|_| {
        ConfigError::InvalidValue {
            key: "type".to_string(),
            message: format!("unknown provider type {value:?}"),
        }
    })
}

impl GatewayConfig {
    /// Loads configuration from a YAML file, then applies environment
    /// overrides under `env_prefix`. A `.env` file is honored when
    /// present.
    pub fn from_file(path: impl AsRef<Path>, env_prefix: &str) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let contents = std::fs::read_to_string(path)?;
        let mut config: GatewayConfig = serde_yaml::from_str(&contents)?;
        config.fill_provider_names();
        config.apply_env_overrides(env_prefix)?;
        Ok(config)
    }

    /// Builds configuration from environment variables alone. The
    /// provider set comes from `{PREFIX}_PROVIDERS`, a comma-separated
    /// list of names; each provider then needs at least
    /// `{PREFIX}_PROVIDERS_{NAME}_TYPE`.
    pub fn from_env(env_prefix: &str) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let mut config = GatewayConfig::default();

        if let Some(names) = env_var(env_prefix, "providers") {
            for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                let type_key = format!("providers.{name}.type");
                let provider_type = env_var(env_prefix, &type_key).ok_or_else(|| {
                    ConfigError::InvalidValue {
                        key: type_key.clone(),
                        message: "provider type is required".to_string(),
                    }
                })?;
                let provider_type = parse_provider_type(&provider_type)?;
                config
                    .providers
                    .insert(name.to_string(), ProviderConfig::new(name, provider_type));
            }
        }

        config.apply_env_overrides(env_prefix)?;
        Ok(config)
    }

    fn fill_provider_names(&mut self) {
        for (name, provider) in self.providers.iter_mut() {
            if provider.name.is_empty() {
                provider.name = name.clone();
            }
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        if let Some(level) = env_var(prefix, "log.level") {
            self.log.level = level;
        }
        if let Some(format) = env_var(prefix, "log.format") {
            self.log.format = format;
        }

        let names: Vec<String> = self.providers.keys().cloned().collect();
        for name in names {
            if let Some(api_key) = env_var(prefix, &format!("providers.{name}.api_key")) {
                if let Some(provider) = self.providers.get_mut(&name) {
                    provider.api_key = api_key;
                }
            }
            if let Some(base_url) = env_var(prefix, &format!("providers.{name}.base_url")) {
                if let Some(provider) = self.providers.get_mut(&name) {
                    provider.base_url = Some(base_url);
                }
            }
            if let Some(model) = env_var(prefix, &format!("providers.{name}.model")) {
                if let Some(provider) = self.providers.get_mut(&name) {
                    provider.model = model;
                }
            }
            if let Some(enabled) = env_var(prefix, &format!("providers.{name}.enabled")) {
                let parsed = enabled.parse().map_err(|_| ConfigError::InvalidValue {
                    key: format!("providers.{name}.enabled"),
                    message: format!("expected true or false, got {enabled:?}"),
                })?;
                if let Some(provider) = self.providers.get_mut(&name) {
                    provider.enabled = parsed;
                }
            }
            if let Some(timeout) = env_var(prefix, &format!("providers.{name}.timeout_secs")) {
                let parsed = timeout.parse().map_err(|_| ConfigError::InvalidValue {
                    key: format!("providers.{name}.timeout_secs"),
                    message: format!("expected seconds, got {timeout:?}"),
                })?;
                if let Some(provider) = self.providers.get_mut(&name) {
                    provider.timeout_secs = Some(parsed);
                }
            }
        }

        for capability in Capability::ALL {
            if let Some(fallback) = env_var(prefix, &format!("fallbacks.{capability}")) {
                self.fallbacks.insert(capability.to_string(), fallback);
            }
        }

        if let Some(url) = env_var(prefix, "supabase.url") {
            let supabase = self.supabase.get_or_insert_with(SupabaseSettings::default);
            supabase.url = url;
        }
        if let Some(api_key) = env_var(prefix, "supabase.api_key") {
            let supabase = self.supabase.get_or_insert_with(SupabaseSettings::default);
            supabase.api_key = api_key;
        }

        Ok(())
    }

    /// Builds the discovery view: enabled provider records only, plus
    /// the inclusion/exclusion lists.
    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            provider_configs: self
                .providers
                .iter()
                .filter(|(_, p)| p.enabled)
                .map(|(name, p)| (name.clone(), p.clone()))
                .collect(),
            enabled_providers: self.enabled_providers.clone(),
            disabled_providers: self.disabled_providers.clone(),
        }
    }
}

impl FallbackPolicy for GatewayConfig {
    fn fallback_provider(&self, capability: Capability) -> Option<String> {
        self.fallbacks
            .get(capability.as_str())
            .filter(|name| !name.is_empty())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_key_replacer() {
        assert_eq!(
            env_key("OMNIVOX", "providers.openai.api_key"),
            "OMNIVOX_PROVIDERS_OPENAI_API_KEY"
        );
        assert_eq!(
            env_key("OMNIVOX", "providers.minimax-llm.model"),
            "OMNIVOX_PROVIDERS_MINIMAX_LLM_MODEL"
        );
        assert_eq!(env_key("", "log.level"), "LOG_LEVEL");
    }

    #[test]
    fn yaml_parse_with_defaults() {
        let yaml = r#"
log:
  level: debug
providers:
  deepgram:
    type: deepgram
    api_key: dg-key
  yandex:
    type: yandex
    api_key: ya-key
    options:
      folder_id: b1gfolder
fallbacks:
  stt: deepgram
disabled_providers: [yandex]
"#;
        let mut config: GatewayConfig = serde_yaml::from_str(yaml).unwrap();
        config.fill_provider_names();

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers["deepgram"].name, "deepgram");
        assert_eq!(
            config.providers["yandex"].options["folder_id"],
            serde_json::Value::from("b1gfolder")
        );

        let discovery = config.discovery_config();
        let effective = discovery.filter_configs();
        assert!(effective.contains_key("deepgram"));
        assert!(!effective.contains_key("yandex"));

        assert_eq!(
            config.fallback_provider(Capability::Stt),
            Some("deepgram".to_string())
        );
        assert_eq!(config.fallback_provider(Capability::Tts), None);
    }

    #[test]
    fn disabled_provider_excluded_from_discovery() {
        let mut config = GatewayConfig::default();
        let mut provider = ProviderConfig::new("openai", ProviderType::OpenAi);
        provider.enabled = false;
        config.providers.insert("openai".to_string(), provider);

        assert!(config.discovery_config().filter_configs().is_empty());
    }
}
