use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::core::capability::Capability;
use crate::core::error::ProviderError;
use crate::core::models::{ProviderConfig, ProviderType, Voice};
use crate::core::registry::ProviderPlugin;
use crate::core::services::{Provider, TtsService};

pub(crate) const DEFAULT_BASE_URL: &str = "wss://api.minimax.io";

/// A voice catalog entry from the `voices` provider option.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct VoiceEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub description: String,
}

/// Recognized provider-level options for Minimax TTS. Unknown keys are
/// rejected at initialize time.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct MinimaxOptions {
    /// Language → voice catalog override.
    pub voices: Option<HashMap<String, Vec<VoiceEntry>>>,
    /// Language → default voice id.
    pub default_voices: Option<HashMap<String, String>>,
    pub sample_rate: Option<u32>,
    pub format: Option<String>,
    pub speed: Option<f64>,
    pub volume: Option<f64>,
}

impl MinimaxOptions {
    fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        if config.options.is_empty() {
            return Ok(Self::default());
        }
        let value = serde_json::to_value(&config.options)
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| {
            ProviderError::Configuration(format!("invalid options for provider minimax: {e}"))
        })
    }
}

pub(crate) struct MinimaxInner {
    pub config: ProviderConfig,
    pub options: MinimaxOptions,
    pub base_url: String,
    pub initialized: AtomicBool,
}

impl MinimaxInner {
    pub(crate) fn ensure_initialized(&self) -> Result<(), ProviderError> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ProviderError::NotInitialized)
        }
    }

    pub(crate) fn api_key(&self) -> &str {
        &self.config.api_key
    }

    /// Default voice for a language: configured `default_voices` first,
    /// then the built-in table, then the global default.
    pub(crate) fn default_voice_for_language(&self, language: &str) -> String {
        if let Some(defaults) = &self.options.default_voices {
            if let Some(voice) = defaults.get(language).filter(|v| !v.is_empty()) {
                return voice.clone();
            }
        }
        match language {
            "en" => "presenter_male",
            "zh" => "male-qn-qingse",
            "ru" => "Russian_ReliableMan",
            _ => "male-qn-qingse",
        }
        .to_string()
    }

    /// The voice catalog: configured override when present, built-in
    /// list otherwise.
    pub(crate) fn voice_catalog(&self) -> Vec<Voice> {
        if let Some(configured) = &self.options.voices {
            let mut voices = Vec::new();
            for (language, entries) in configured {
                for entry in entries {
                    if entry.id.is_empty() {
                        continue;
                    }
                    voices.push(Voice {
                        id: entry.id.clone(),
                        name: entry.name.clone(),
                        language: language.clone(),
                        gender: entry.gender.clone(),
                        description: entry.description.clone(),
                        ..Default::default()
                    });
                }
            }
            if !voices.is_empty() {
                return voices;
            }
        }

        vec![
            Voice {
                id: "male-qn-qingse".to_string(),
                name: "Male Qingse".to_string(),
                language: "zh".to_string(),
                gender: "male".to_string(),
                description: "Clear male voice with natural tone".to_string(),
                ..Default::default()
            },
            Voice {
                id: "female-shaonv".to_string(),
                name: "Female Shaonv".to_string(),
                language: "zh".to_string(),
                gender: "female".to_string(),
                description: "Young female voice".to_string(),
                ..Default::default()
            },
            Voice {
                id: "female-yujie".to_string(),
                name: "Female Yujie".to_string(),
                language: "zh".to_string(),
                gender: "female".to_string(),
                description: "Mature female voice".to_string(),
                ..Default::default()
            },
            Voice {
                id: "presenter_male".to_string(),
                name: "Presenter Male".to_string(),
                language: "en".to_string(),
                gender: "male".to_string(),
                description: "Professional presenter voice".to_string(),
                ..Default::default()
            },
            Voice {
                id: "presenter_female".to_string(),
                name: "Presenter Female".to_string(),
                language: "en".to_string(),
                gender: "female".to_string(),
                description: "Professional female presenter voice".to_string(),
                ..Default::default()
            },
        ]
    }
}

/// Minimax text-to-speech provider over the T2A v2 WebSocket protocol.
pub struct MinimaxProvider {
    pub(crate) inner: Arc<MinimaxInner>,
}

impl MinimaxProvider {
    pub fn initialize(config: ProviderConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() {
            return Err(ProviderError::Configuration(
                "Minimax API key is required".to_string(),
            ));
        }

        let options = MinimaxOptions::from_config(&config)?;
        let base_url = config
            .base_url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            inner: Arc::new(MinimaxInner {
                config,
                options,
                base_url,
                initialized: AtomicBool::new(true),
            }),
        })
    }
}

#[async_trait]
impl Provider for MinimaxProvider {
    fn name(&self) -> &str {
        "minimax"
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Minimax
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Tts]
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.inner.ensure_initialized()?;
        if self.inner.config.api_key.is_empty() {
            return Err(ProviderError::Configuration(
                "health check failed: invalid configuration".to_string(),
            ));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ProviderError> {
        self.inner.initialized.store(false, Ordering::Release);
        Ok(())
    }

    fn tts(&self) -> Option<Arc<dyn TtsService>> {
        Some(Arc::new(super::tts::MinimaxTtsService {
            inner: self.inner.clone(),
        }))
    }
}

/// Plugin producing the Minimax provider.
pub struct MinimaxPlugin;

#[async_trait]
impl ProviderPlugin for MinimaxPlugin {
    fn name(&self) -> &str {
        "minimax"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Tts]
    }

    fn metadata(&self) -> HashMap<String, Value> {
        let mut metadata = HashMap::new();
        metadata.insert("transport".to_string(), Value::from("websocket"));
        metadata.insert("protocol".to_string(), Value::from("t2a_v2"));
        metadata
    }

    async fn initialize(
        &self,
        config: ProviderConfig,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        Ok(Arc::new(MinimaxProvider::initialize(config)?))
    }
}
