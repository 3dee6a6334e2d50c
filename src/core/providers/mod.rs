//! Provider implementations: one module per vendor. Each owns its
//! transport (HTTP+JSON, gRPC/TLS, or WebSocket/TLS), translates the
//! uniform config into the vendor's wire schema, and exposes streaming
//! clients plus request-response calls behind the capability traits.

pub mod cartesia;
pub mod deepgram;
pub mod minimax;
pub mod openai;
pub mod yandex;

pub(crate) mod ws;

/// Registers every built-in plugin with a plugin registry. The Yandex
/// LLM gateway plugin shares the `yandex` name with the SpeechKit plugin
/// and is registered separately when a deployment wants chat/embedding
/// instead of speech.
pub fn register_builtin_plugins(
    plugins: &crate::core::registry::PluginRegistry,
) -> Result<(), crate::core::registry::PluginError> {
    use std::sync::Arc;

    plugins.register_plugin(Arc::new(openai::OpenAiCompatPlugin::openai()))?;
    plugins.register_plugin(Arc::new(openai::OpenAiCompatPlugin::openrouter()))?;
    plugins.register_plugin(Arc::new(openai::OpenAiCompatPlugin::minimax_llm()))?;
    plugins.register_plugin(Arc::new(deepgram::DeepgramPlugin))?;
    plugins.register_plugin(Arc::new(cartesia::CartesiaPlugin))?;
    plugins.register_plugin(Arc::new(minimax::MinimaxPlugin))?;
    plugins.register_plugin(Arc::new(yandex::YandexPlugin))?;
    Ok(())
}
