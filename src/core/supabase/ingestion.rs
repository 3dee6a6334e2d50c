//! Ingestion-pipeline operations: job lifecycle, document upserts, and
//! batch embedding inserts.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

use super::client::{SupabaseClient, SupabaseError};

/// An ingestion job row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Job {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub source_id: Uuid,
    pub status: String,
    pub job_type: String,
    pub resource_url: String,
    #[serde(default)]
    pub pages_processed: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
}

/// A document row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub source_id: Uuid,
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub hash: String,
}

/// An embedding row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Embedding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub document_id: Uuid,
    pub vector: Vec<f32>,
    pub chunk: String,
}

impl SupabaseClient {
    /// Creates an ingestion job; the created row (with its id) is written
    /// back into `job`.
    pub async fn create_job(&self, job: &mut Job) -> Result<(), SupabaseError> {
        let url = format!("{}/rest/v1/ingestion_jobs", self.url);
        let response = self
            .rest_headers(self.http.post(&url))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(job)
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::CREATED {
            return Err(SupabaseError::Status {
                operation: "create job",
                status: response.status().as_u16(),
            });
        }

        let mut rows: Vec<Job> = response.json().await?;
        if let Some(created) = rows.pop() {
            *job = created;
        }
        Ok(())
    }

    /// Updates a job's status, progress, and error message.
    pub async fn update_job(&self, job: &mut Job) -> Result<(), SupabaseError> {
        let Some(id) = job.id else {
            return Err(SupabaseError::JobNotFound);
        };

        let url = format!("{}/rest/v1/ingestion_jobs?id=eq.{id}", self.url);
        let payload = json!({
            "status": job.status,
            "pages_processed": job.pages_processed,
            "error_message": job.error_message,
        });

        let response = self
            .rest_headers(self.http.patch(&url))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SupabaseError::Status {
                operation: "update job",
                status: response.status().as_u16(),
            });
        }

        let mut rows: Vec<Job> = response.json().await?;
        if let Some(updated) = rows.pop() {
            *job = updated;
        }
        Ok(())
    }

    /// Retrieves a job by id.
    pub async fn get_job(&self, id: Uuid) -> Result<Job, SupabaseError> {
        let url = format!("{}/rest/v1/ingestion_jobs?id=eq.{id}", self.url);
        let response = self.rest_headers(self.http.get(&url)).send().await?;

        if !response.status().is_success() {
            return Err(SupabaseError::Status {
                operation: "get job",
                status: response.status().as_u16(),
            });
        }

        let rows: Vec<Job> = response.json().await?;
        rows.into_iter().next().ok_or(SupabaseError::JobNotFound)
    }

    /// Creates or updates a document, deduplicated server-side, and
    /// returns its id.
    pub async fn upsert_document(&self, document: &Document) -> Result<Uuid, SupabaseError> {
        let url = format!("{}/rest/v1/documents", self.url);
        let response = self
            .rest_headers(self.http.post(&url))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation,resolution=merge-duplicates")
            .json(document)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::CREATED && status != reqwest::StatusCode::OK {
            return Err(SupabaseError::Status {
                operation: "upsert document",
                status: status.as_u16(),
            });
        }

        let rows: Vec<Document> = response.json().await?;
        rows.into_iter()
            .next()
            .and_then(|d| d.id)
            .ok_or(SupabaseError::NoDocumentReturned)
    }

    /// Inserts a batch of embeddings; a no-op for an empty batch.
    pub async fn batch_insert_embeddings(
        &self,
        embeddings: &[Embedding],
    ) -> Result<(), SupabaseError> {
        if embeddings.is_empty() {
            return Ok(());
        }

        let url = format!("{}/rest/v1/embeddings", self.url);
        let response = self
            .rest_headers(self.http.post(&url))
            .header("Content-Type", "application/json")
            .json(embeddings)
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::CREATED {
            return Err(SupabaseError::Status {
                operation: "insert embeddings",
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}
