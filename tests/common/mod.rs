//! Shared test support: an in-memory stub provider with controllable
//! health/close behavior, and a minimal WebSocket stub server.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;

use omnivox::core::services::{ChatService, Provider, SttService, SttStream};
use omnivox::{Capability, ChatMessage, ChatOptions, Model, ProviderError, ProviderType, SttConfig, SttResult};

/// A provider stub with scriptable health and close behavior.
pub struct StubProvider {
    pub name: String,
    pub capabilities: Vec<Capability>,
    pub health_delay: Duration,
    pub health_fails: bool,
    pub close_fails: bool,
    pub expose_services: bool,
    pub closed: AtomicBool,
}

impl StubProvider {
    pub fn new(name: &str, capabilities: Vec<Capability>) -> Self {
        Self {
            name: name.to_string(),
            capabilities,
            health_delay: Duration::ZERO,
            health_fails: false,
            close_fails: false,
            expose_services: true,
            closed: AtomicBool::new(false),
        }
    }

    /// Declares capabilities without exposing the matching service
    /// handles, for exercising interface-mismatch errors.
    pub fn without_services(mut self) -> Self {
        self.expose_services = false;
        self
    }

    pub fn with_health_delay(mut self, delay: Duration) -> Self {
        self.health_delay = delay;
        self
    }

    pub fn failing_health(mut self) -> Self {
        self.health_fails = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.close_fails = true;
        self
    }
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
        if !self.health_delay.is_zero() {
            tokio::time::sleep(self.health_delay).await;
        }
        if self.health_fails {
            Err(ProviderError::Upstream("stub is unhealthy".to_string()))
        } else {
            Ok(())
        }
    }

    async fn close(&self) -> Result<(), ProviderError> {
        self.closed.store(true, Ordering::SeqCst);
        if self.close_fails {
            Err(ProviderError::Network("close failed".to_string()))
        } else {
            Ok(())
        }
    }

    fn chat(&self) -> Option<Arc<dyn ChatService>> {
        if self.expose_services && self.capabilities.contains(&Capability::Chat) {
            Some(Arc::new(StubChatService {
                provider: self.name.clone(),
            }))
        } else {
            None
        }
    }

    fn stt(&self) -> Option<Arc<dyn SttService>> {
        if self.expose_services && self.capabilities.contains(&Capability::Stt) {
            Some(Arc::new(StubSttService {
                provider: self.name.clone(),
            }))
        } else {
            None
        }
    }
}

pub struct StubChatService {
    pub provider: String,
}

#[async_trait]
impl ChatService for StubChatService {
    async fn chat_completion(
        &self,
        _messages: &[ChatMessage],
        _options: &ChatOptions,
    ) -> Result<String, ProviderError> {
        Ok(format!("reply from {}", self.provider))
    }

    async fn stream_chat_completion(
        &self,
        _messages: &[ChatMessage],
        _options: &ChatOptions,
    ) -> Result<(mpsc::Receiver<String>, mpsc::Receiver<ProviderError>), ProviderError> {
        let (content_tx, content_rx) = mpsc::channel(1);
        let (_err_tx, err_rx) = mpsc::channel(1);
        drop(content_tx);
        Ok((content_rx, err_rx))
    }

    async fn models(&self) -> Result<Vec<Model>, ProviderError> {
        Ok(Vec::new())
    }
}

pub struct StubSttService {
    pub provider: String,
}

#[async_trait]
impl SttService for StubSttService {
    async fn transcribe(&self, _audio: &[u8], _config: SttConfig) -> Result<String, ProviderError> {
        Ok(String::new())
    }

    async fn new_stt_stream(
        &self,
        _config: SttConfig,
    ) -> Result<Arc<dyn SttStream>, ProviderError> {
        Err(ProviderError::Configuration(
            "stub has no streaming transport".to_string(),
        ))
    }

    async fn models(&self) -> Result<Vec<Model>, ProviderError> {
        Ok(Vec::new())
    }
}

/// Result type produced by [`SttStream`] stubs in assertions.
pub fn final_result(text: &str) -> SttResult {
    SttResult::new(text.to_string(), true, 1.0)
}

/// Binds a local WebSocket server, runs `handler` for the first
/// connection, and returns the `ws://` base URL.
pub async fn spawn_ws_stub<F, Fut>(handler: F) -> String
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let ws = tokio_tungstenite::accept_async(stream)
                .await
                .expect("WebSocket handshake failed");
            handler(ws).await;
        }
    });

    format!("ws://{addr}")
}
