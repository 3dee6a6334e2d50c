//! Supabase REST/RPC client: source validation with a TTL cache and
//! vector similarity search.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use super::types::{CacheEntry, SearchRequest, SearchResult, SourceConfig};

/// Default TTL for cached source configurations.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
/// Default HTTP timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from Supabase operations.
#[derive(Debug, thiserror::Error)]
pub enum SupabaseError {
    #[error("supabase URL is required")]
    MissingUrl,

    #[error("supabase API key is required")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} failed: status {status}")]
    Status { operation: &'static str, status: u16 },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("source not found")]
    SourceNotFound,

    #[error("source is disabled")]
    SourceDisabled,

    #[error("job not found")]
    JobNotFound,

    #[error("no document returned")]
    NoDocumentReturned,
}

/// Configuration for [`SupabaseClient`].
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub api_key: String,
    pub cache_ttl: Duration,
    pub timeout: Duration,
}

impl SupabaseConfig {
    pub fn new(url: &str, api_key: &str) -> Self {
        Self {
            url: url.to_string(),
            api_key: api_key.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Default)]
pub(crate) struct SourceCache {
    by_token: HashMap<String, CacheEntry>,
    by_id: HashMap<String, CacheEntry>,
}

/// REST/RPC client for the Supabase backend.
pub struct SupabaseClient {
    pub(crate) url: String,
    pub(crate) api_key: String,
    pub(crate) http: reqwest::Client,
    cache: RwLock<SourceCache>,
    cache_ttl: Duration,
}

/// Raw row from the `sources` table; `enabled` is nullable.
#[derive(Debug, Deserialize)]
struct SourceRow {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    public_token: String,
    #[serde(default)]
    allowed_origins: Vec<String>,
    #[serde(default)]
    strategy: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    system_prompt: String,
    #[serde(default)]
    rate_limit: i64,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    metadata: Option<HashMap<String, Value>>,
}

impl SourceRow {
    fn into_domain(self) -> SourceConfig {
        SourceConfig {
            id: self.id,
            name: self.name,
            public_token: self.public_token,
            allowed_origins: self.allowed_origins,
            strategy: self.strategy,
            content: self.content,
            system_prompt: self.system_prompt,
            rate_limit: self.rate_limit,
            enabled: self.enabled.unwrap_or(true),
            metadata: self.metadata.unwrap_or_default(),
        }
    }
}

impl SupabaseClient {
    pub fn new(config: SupabaseConfig) -> Result<Self, SupabaseError> {
        if config.url.is_empty() {
            return Err(SupabaseError::MissingUrl);
        }
        if config.api_key.is_empty() {
            return Err(SupabaseError::MissingApiKey);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            http,
            cache: RwLock::new(SourceCache::default()),
            cache_ttl: config.cache_ttl,
        })
    }

    pub(crate) fn rest_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
    }

    /// Validates a public token and returns the associated source.
    /// Disabled sources error and are never cached.
    pub async fn validate_token(&self, public_token: &str) -> Result<SourceConfig, SupabaseError> {
        if let Some(source) = self.cached_by_token(public_token) {
            return Ok(source);
        }

        let url = format!(
            "{}/rest/v1/sources?public_token=eq.{public_token}&select=*",
            self.url
        );
        debug!(url = %url, "querying Supabase for token");

        let response = self.rest_headers(self.http.get(&url)).send().await?;
        if !response.status().is_success() {
            error!(status = %response.status(), "Supabase token validation failed");
            return Err(SupabaseError::Status {
                operation: "token validation",
                status: response.status().as_u16(),
            });
        }

        let rows: Vec<SourceRow> = response.json().await?;
        let row = rows.into_iter().next().ok_or(SupabaseError::SourceNotFound)?;
        let source = row.into_domain();

        if !source.is_enabled() {
            return Err(SupabaseError::SourceDisabled);
        }

        self.add_to_cache(&source);
        Ok(source)
    }

    /// Retrieves a source by id.
    pub async fn get_source_by_id(&self, source_id: &str) -> Result<SourceConfig, SupabaseError> {
        if let Some(source) = self.cached_by_id(source_id) {
            return Ok(source);
        }

        let url = format!("{}/rest/v1/sources?id=eq.{source_id}&select=*", self.url);
        debug!(url = %url, "querying Supabase for source id");

        let response = self.rest_headers(self.http.get(&url)).send().await?;
        if !response.status().is_success() {
            error!(status = %response.status(), "Supabase source query failed");
            return Err(SupabaseError::Status {
                operation: "source query",
                status: response.status().as_u16(),
            });
        }

        let rows: Vec<SourceRow> = response.json().await?;
        let row = rows.into_iter().next().ok_or(SupabaseError::SourceNotFound)?;
        let source = row.into_domain();

        self.add_to_cache(&source);
        Ok(source)
    }

    /// Vector similarity search via the `search_documents_by_source` RPC.
    pub async fn search_documents(
        &self,
        request: &SearchRequest,
    ) -> Result<Vec<SearchResult>, SupabaseError> {
        #[derive(Debug, Deserialize)]
        struct RpcRow {
            #[serde(default)]
            content_chunk: String,
            #[serde(default)]
            similarity: f64,
            #[serde(default)]
            metadata: Option<HashMap<String, Value>>,
        }

        let url = format!("{}/rest/v1/rpc/search_documents_by_source", self.url);
        let params = json!({
            "p_source_id": request.source_id,
            "query_embedding": request.query_embedding,
            "match_threshold": request.threshold,
            "match_count": request.max_results,
        });

        let response = self
            .rest_headers(self.http.post(&url))
            .header("Content-Type", "application/json")
            .json(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!(status, body = %body, "Supabase RPC failed");
            return Err(SupabaseError::Status {
                operation: "document search",
                status,
            });
        }

        let rows: Vec<RpcRow> = response.json().await?;
        Ok(rows
            .into_iter()
            .map(|row| SearchResult {
                content: row.content_chunk,
                similarity: row.similarity,
                metadata: row.metadata.unwrap_or_default(),
            })
            .collect())
    }

    /// Drops all cached source configurations.
    pub fn clear_cache(&self) {
        let mut cache = self.cache.write();
        cache.by_token.clear();
        cache.by_id.clear();
    }

    fn cached_by_token(&self, token: &str) -> Option<SourceConfig> {
        let cache = self.cache.read();
        let entry = cache.by_token.get(token)?;
        // Stale entries are treated as misses.
        if SystemTime::now() > entry.expires_at {
            return None;
        }
        Some(entry.source.clone())
    }

    fn cached_by_id(&self, id: &str) -> Option<SourceConfig> {
        let cache = self.cache.read();
        let entry = cache.by_id.get(id)?;
        if SystemTime::now() > entry.expires_at {
            return None;
        }
        Some(entry.source.clone())
    }

    fn add_to_cache(&self, source: &SourceConfig) {
        let expires_at = SystemTime::now() + self.cache_ttl;
        let mut cache = self.cache.write();
        if !source.public_token.is_empty() {
            cache.by_token.insert(
                source.public_token.clone(),
                CacheEntry {
                    source: source.clone(),
                    expires_at,
                },
            );
        }
        if !source.id.is_empty() {
            cache.by_id.insert(
                source.id.clone(),
                CacheEntry {
                    source: source.clone(),
                    expires_at,
                },
            );
        }
    }
}
