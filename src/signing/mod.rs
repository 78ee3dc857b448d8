//! URL signing module
//!
//! Obtains presigned PUT URLs from a URL-signing collaborator.
//!
//! Reference: [`HttpUrlSigner`] talks to the presign service in
//! [`crate::presign`] (or anything speaking the same JSON contract).

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub mod http;

pub use http::HttpUrlSigner;

/// Signing errors
#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Signing request failed: {0}")]
    RequestError(String),

    #[error("Signing service returned status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Failed to retrieve presigned URL")]
    MissingUrl,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Parameters sent to the URL-signing collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresignRequest {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub expires_in: u64,
}

/// A presigned URL granted for a single PUT of one object key
///
/// Consumed once by the transfer step and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrlGrant {
    pub url: String,
    pub object_key: String,
}

impl SignedUrlGrant {
    /// The stable object address: the signed URL without its query string
    pub fn object_url(&self) -> &str {
        strip_query(&self.url)
    }
}

/// Drop everything from the first `?` onward
pub fn strip_query(url: &str) -> &str {
    match url.find('?') {
        Some(idx) => &url[..idx],
        None => url,
    }
}

/// URL-signing collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UrlSigner: Send + Sync {
    /// Request a presigned PUT URL for `request.key`
    async fn presign(&self, request: &PresignRequest) -> Result<SignedUrlGrant, SigningError>;
}
