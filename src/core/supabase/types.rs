use std::collections::HashMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Configuration for a source from the `sources` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    pub public_token: String,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// `none`, `vector`, or `fulltext`.
    #[serde(default)]
    pub strategy: String,
    /// Static content for the `none` strategy.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub system_prompt: String,
    /// Requests per minute.
    #[serde(default)]
    pub rate_limit: i64,
    pub enabled: bool,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

pub(crate) const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Use the provided context to answer accurately. If no context is provided, use your general knowledge. Keep responses conversational and helpful.";

impl SourceConfig {
    /// Whether the given origin may use this source. An empty origin
    /// list denies everything; `*` allows everything.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.allowed_origins.is_empty() {
            return false;
        }
        self.allowed_origins
            .iter()
            .any(|allowed| allowed == "*" || allowed == origin)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The content strategy, defaulting to `vector`.
    pub fn strategy(&self) -> &str {
        if self.strategy.is_empty() {
            "vector"
        } else {
            &self.strategy
        }
    }

    /// The system prompt, or the default when unset.
    pub fn system_prompt(&self) -> &str {
        if self.system_prompt.is_empty() {
            DEFAULT_SYSTEM_PROMPT
        } else {
            &self.system_prompt
        }
    }

    /// Requests per minute, defaulting to 60.
    pub fn rate_limit(&self) -> i64 {
        if self.rate_limit <= 0 {
            60
        } else {
            self.rate_limit
        }
    }
}

/// A vector similarity search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub source_id: String,
    pub query_embedding: Vec<f32>,
    pub max_results: u32,
    /// Minimum similarity threshold in [0, 1].
    pub threshold: f64,
}

/// One document search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub content: String,
    pub similarity: f64,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

pub(crate) struct CacheEntry {
    pub source: SourceConfig,
    pub expires_at: SystemTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(allowed_origins: Vec<&str>) -> SourceConfig {
        SourceConfig {
            id: "s1".to_string(),
            name: "Site".to_string(),
            public_token: "tok".to_string(),
            allowed_origins: allowed_origins.into_iter().map(String::from).collect(),
            strategy: String::new(),
            content: String::new(),
            system_prompt: String::new(),
            rate_limit: 0,
            enabled: true,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn origin_checks() {
        assert!(!source(vec![]).is_origin_allowed("https://a.example"));
        assert!(source(vec!["*"]).is_origin_allowed("https://a.example"));
        assert!(source(vec!["https://a.example"]).is_origin_allowed("https://a.example"));
        assert!(!source(vec!["https://a.example"]).is_origin_allowed("https://b.example"));
    }

    #[test]
    fn defaults() {
        let s = source(vec![]);
        assert_eq!(s.strategy(), "vector");
        assert_eq!(s.rate_limit(), 60);
        assert_eq!(s.system_prompt(), DEFAULT_SYSTEM_PROMPT);
    }
}
