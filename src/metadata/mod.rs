//! Upload metadata module
//!
//! Records where an uploaded file landed. Object storage stays the source of
//! truth; callers treat every [`MetadataError`] as non-fatal.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Metadata errors
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Metadata request failed: {0}")]
    RequestError(String),

    #[error("Metadata service returned status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Record persisted after a successful transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMetadata {
    pub owner_context: String,
    pub file_name: String,
    pub object_key: String,
    pub object_url: String,
}

/// Metadata collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn save(&self, metadata: &FileMetadata) -> Result<(), MetadataError>;
}

/// Metadata store backed by an HTTP endpoint
pub struct HttpMetadataStore {
    url: String,
    client: reqwest::Client,
}

impl HttpMetadataStore {
    /// Create a store that POSTs records to `url`
    pub fn new(url: &str, timeout: Duration) -> Result<Self, MetadataError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MetadataError::ConfigError(e.to_string()))?;

        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl MetadataStore for HttpMetadataStore {
    #[tracing::instrument(
        name = "metadata.save",
        skip(self, metadata),
        fields(s3.key = %metadata.object_key, http.status_code = tracing::field::Empty),
        err
    )]
    async fn save(&self, metadata: &FileMetadata) -> Result<(), MetadataError> {
        let response = self
            .client
            .post(&self.url)
            .json(metadata)
            .send()
            .await
            .map_err(|e| MetadataError::RequestError(e.to_string()))?;

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MetadataError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Store used when no metadata service is configured
pub struct DiscardMetadataStore;

#[async_trait]
impl MetadataStore for DiscardMetadataStore {
    async fn save(&self, metadata: &FileMetadata) -> Result<(), MetadataError> {
        tracing::debug!(key = %metadata.object_key, "No metadata service configured, skipping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_serializes_snake_case() {
        let metadata = FileMetadata {
            owner_context: "rec123".into(),
            file_name: "report.pdf".into(),
            object_key: "uploads/rec123/1_report.pdf".into(),
            object_url: "https://host/uploads/rec123/1_report.pdf".into(),
        };
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["owner_context"], "rec123");
        assert_eq!(json["object_key"], "uploads/rec123/1_report.pdf");
    }

    #[tokio::test]
    async fn test_discard_store() {
        let metadata = FileMetadata {
            owner_context: "rec".into(),
            file_name: "a".into(),
            object_key: "k".into(),
            object_url: "u".into(),
        };
        assert!(DiscardMetadataStore.save(&metadata).await.is_ok());
    }
}
