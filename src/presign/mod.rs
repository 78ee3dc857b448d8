//! Presign service
//!
//! Validates presign requests against bucket and key-prefix allowlists and
//! asks a [`Presigner`] for a time-limited PUT URL.
//!
//! # Request / response
//!
//! ```text
//! POST /presign
//! {"bucket": "my-bucket", "key": "uploads/a.txt", "content_type": "text/plain", "expires_in": 300}
//!
//! 200 {"presigned_url": "...", "method": "PUT", "expires_in": 300,
//!      "s3_object_key": "uploads/a.txt", "bucket": "my-bucket"}
//! 400 {"error": "bucket and key are required"}
//! 403 {"error": "bucket not allowed"}
//! 403 {"error": "key/prefix not allowed"}
//! 500 {"error": "..."}
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub mod s3;

pub use s3::S3Presigner;

/// Expiry used when a request does not name one
pub const DEFAULT_EXPIRES_IN: u64 = 900;

/// Presign errors
#[derive(Error, Debug)]
pub enum PresignError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Presigning failed: {0}")]
    SigningError(String),
}

/// Presigner backend
#[async_trait]
pub trait Presigner: Send + Sync {
    /// Produce a presigned PUT URL for `bucket`/`key`
    ///
    /// When `content_type` is set it becomes part of the signature.
    async fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        expires_in: u64,
    ) -> Result<String, PresignError>;
}

/// Bucket and key-prefix allowlists; an empty list allows everything
#[derive(Debug, Clone, Default)]
pub struct PresignPolicy {
    allowed_buckets: Vec<String>,
    allowed_key_prefixes: Vec<String>,
}

impl PresignPolicy {
    pub fn new(allowed_buckets: &[String], allowed_key_prefixes: &[String]) -> Self {
        fn clean(values: &[String]) -> Vec<String> {
            values
                .iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect()
        }

        Self {
            allowed_buckets: clean(allowed_buckets),
            allowed_key_prefixes: clean(allowed_key_prefixes),
        }
    }

    pub fn is_allowed_bucket(&self, bucket: &str) -> bool {
        self.allowed_buckets.is_empty() || self.allowed_buckets.iter().any(|b| b == bucket)
    }

    pub fn is_allowed_key(&self, key: &str) -> bool {
        self.allowed_key_prefixes.is_empty()
            || self
                .allowed_key_prefixes
                .iter()
                .any(|p| key.starts_with(p.as_str()))
    }
}

/// Incoming presign request body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PresignParams {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default, alias = "contentType")]
    pub content_type: Option<String>,
    #[serde(default, alias = "expiresIn", deserialize_with = "number_or_numeric_string")]
    pub expires_in: Option<u64>,
}

/// Accept `300` as well as `"300"`
fn number_or_numeric_string<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid expires_in '{}'", text))),
    }
}

/// Successful presign response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignGrant {
    pub presigned_url: String,
    pub method: String,
    pub expires_in: u64,
    pub s3_object_key: String,
    pub bucket: String,
}

/// Status code plus JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct PresignReply {
    pub status: u16,
    pub body: serde_json::Value,
}

impl PresignReply {
    fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": message }),
        }
    }
}

/// Presign request handler
pub struct PresignService {
    policy: PresignPolicy,
    presigner: Arc<dyn Presigner>,
}

impl PresignService {
    pub fn new(policy: PresignPolicy, presigner: Arc<dyn Presigner>) -> Self {
        Self { policy, presigner }
    }

    /// Handle a raw request body
    pub async fn handle_body(&self, body: &[u8]) -> PresignReply {
        match serde_json::from_slice::<PresignParams>(body) {
            Ok(params) => self.handle(params).await,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed presign request body");
                PresignReply::error(400, "request body must be a JSON object")
            }
        }
    }

    /// Handle parsed request parameters
    #[tracing::instrument(
        name = "presign.handle",
        skip(self, params),
        fields(
            s3.bucket = ?params.bucket,
            s3.key = ?params.key,
            http.status_code = tracing::field::Empty
        )
    )]
    pub async fn handle(&self, params: PresignParams) -> PresignReply {
        let reply = self.evaluate(params).await;
        tracing::Span::current().record("http.status_code", reply.status);
        crate::metrics::record_presign_request(reply.status);
        reply
    }

    async fn evaluate(&self, params: PresignParams) -> PresignReply {
        let bucket = params.bucket.unwrap_or_default();
        let key = params.key.unwrap_or_default();

        if bucket.is_empty() || key.is_empty() {
            return PresignReply::error(400, "bucket and key are required");
        }

        if !self.policy.is_allowed_bucket(&bucket) {
            tracing::warn!(bucket = %bucket, "Presign denied: bucket not allowed");
            return PresignReply::error(403, "bucket not allowed");
        }

        if !self.policy.is_allowed_key(&key) {
            tracing::warn!(key = %key, "Presign denied: key prefix not allowed");
            return PresignReply::error(403, "key/prefix not allowed");
        }

        let expires_in = params.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        let content_type = params.content_type.filter(|c| !c.is_empty());

        match self
            .presigner
            .presign_put(&bucket, &key, content_type.as_deref(), expires_in)
            .await
        {
            Ok(presigned_url) => {
                let grant = PresignGrant {
                    presigned_url,
                    method: "PUT".to_string(),
                    expires_in,
                    s3_object_key: key,
                    bucket,
                };
                match serde_json::to_value(&grant) {
                    Ok(body) => PresignReply { status: 200, body },
                    Err(e) => PresignReply::error(500, &e.to_string()),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed generating presigned URL");
                PresignReply::error(500, &e.to_string())
            }
        }
    }
}
