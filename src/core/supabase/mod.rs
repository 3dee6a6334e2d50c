//! Supabase integration: source validation and vector search over the
//! REST/RPC surface, plus ingestion-pipeline writes.

mod client;
mod ingestion;
mod types;

pub use client::{SupabaseClient, SupabaseConfig, SupabaseError, DEFAULT_CACHE_TTL};
pub use ingestion::{Document, Embedding, Job};
pub use types::{SearchRequest, SearchResult, SourceConfig};
