//! HTTP URL signer
//!
//! POSTs a [`PresignRequest`] as JSON and reads the presigned URL back.
//!
//! # Example
//!
//! ```no_run
//! use presign_uploadr::signing::{HttpUrlSigner, PresignRequest, UrlSigner};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let signer = HttpUrlSigner::new("http://localhost:8080/presign", Duration::from_secs(30))?;
//! let grant = signer
//!     .presign(&PresignRequest {
//!         bucket: "my-bucket".into(),
//!         key: "uploads/anonymous/1700000000000_a.txt".into(),
//!         content_type: "text/plain".into(),
//!         expires_in: 600,
//!     })
//!     .await?;
//! println!("PUT to {}", grant.url);
//! # Ok(())
//! # }
//! ```

use super::{PresignRequest, SignedUrlGrant, SigningError, UrlSigner};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Signing service response
///
/// Accepts both the snake_case body produced by the presign service and the
/// camelCase `presignedUrl` shape.
#[derive(Debug, Deserialize)]
struct PresignResponse {
    #[serde(default, alias = "presignedUrl")]
    presigned_url: Option<String>,
    #[serde(default, alias = "objectKey")]
    s3_object_key: Option<String>,
}

/// URL signer backed by an HTTP endpoint
pub struct HttpUrlSigner {
    url: String,
    client: reqwest::Client,
}

impl HttpUrlSigner {
    /// Create a signer that POSTs to `url`
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SigningError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SigningError::ConfigError(e.to_string()))?;

        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl UrlSigner for HttpUrlSigner {
    #[tracing::instrument(
        name = "signing.presign",
        skip(self, request),
        fields(
            s3.bucket = %request.bucket,
            s3.key = %request.key,
            presign.expires_in = request.expires_in,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn presign(&self, request: &PresignRequest) -> Result<SignedUrlGrant, SigningError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| SigningError::RequestError(e.to_string()))?;

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SigningError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: PresignResponse = response
            .json()
            .await
            .map_err(|e| SigningError::RequestError(e.to_string()))?;

        let url = parsed
            .presigned_url
            .filter(|u| !u.trim().is_empty())
            .ok_or(SigningError::MissingUrl)?;

        let object_key = parsed
            .s3_object_key
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| request.key.clone());

        tracing::debug!(object_key = %object_key, "Presigned URL granted");

        Ok(SignedUrlGrant { url, object_key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_accepts_camel_case() {
        let parsed: PresignResponse =
            serde_json::from_str(r#"{"presignedUrl": "https://host/k?sig=1"}"#).unwrap();
        assert_eq!(parsed.presigned_url.as_deref(), Some("https://host/k?sig=1"));
        assert!(parsed.s3_object_key.is_none());
    }

    #[test]
    fn test_response_accepts_snake_case() {
        let parsed: PresignResponse = serde_json::from_str(
            r#"{"presigned_url": "https://host/k", "method": "PUT", "s3_object_key": "k"}"#,
        )
        .unwrap();
        assert_eq!(parsed.presigned_url.as_deref(), Some("https://host/k"));
        assert_eq!(parsed.s3_object_key.as_deref(), Some("k"));
    }

    #[test]
    fn test_signer_creation() {
        let signer = HttpUrlSigner::new("http://localhost:8080/presign", Duration::from_secs(5));
        assert!(signer.is_ok());
        assert_eq!(signer.unwrap().url(), "http://localhost:8080/presign");
    }
}
