//! Storage transfer
//!
//! Sends the whole file in a single PUT to a presigned URL. No chunked
//! uploads and no range requests.
//!
//! # Example
//!
//! ```no_run
//! use presign_uploadr::upload::{FileSource, HttpTransfer, StorageTransfer};
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transfer = HttpTransfer::new()?;
//! transfer
//!     .put(
//!         "https://my-bucket.s3.amazonaws.com/uploads/a.txt?X-Amz-Signature=...",
//!         FileSource::Bytes(Bytes::from("Hello, World!")),
//!         "text/plain",
//!         Arc::new(|sent: u64, total: Option<u64>| println!("{sent}/{total:?}")),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

use super::progress::{ProgressFn, ProgressStream};
use super::{FileSource, UploadError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::StatusCode;
use std::pin::Pin;

/// Size of each body chunk handed to the HTTP client
const CHUNK_SIZE: usize = 64 * 1024;

type BodyStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync>>;

/// Object-storage transfer step
#[async_trait]
pub trait StorageTransfer: Send + Sync {
    /// PUT the whole of `source` to `url`, reporting bytes sent through `progress`
    async fn put(
        &self,
        url: &str,
        source: FileSource,
        content_type: &str,
        progress: ProgressFn,
    ) -> Result<(), UploadError>;
}

/// Transfer over HTTP with `reqwest`
pub struct HttpTransfer {
    client: reqwest::Client,
}

impl HttpTransfer {
    /// Create a transfer with no request timeout
    pub fn new() -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| UploadError::NetworkError(e.to_string()))?;

        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Open `source` as a chunked byte stream plus its length
async fn open_source(source: FileSource) -> Result<(BodyStream, u64), UploadError> {
    match source {
        FileSource::Bytes(body) => {
            let len = body.len() as u64;
            let chunks: Vec<std::io::Result<Bytes>> = (0..body.len())
                .step_by(CHUNK_SIZE)
                .map(|start| Ok(body.slice(start..(start + CHUNK_SIZE).min(body.len()))))
                .collect();
            Ok((Box::pin(futures::stream::iter(chunks)), len))
        }
        FileSource::Path(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| UploadError::FileUnreadable(format!("{}: {}", path.display(), e)))?;
            let len = file
                .metadata()
                .await
                .map_err(|e| UploadError::FileUnreadable(format!("{}: {}", path.display(), e)))?
                .len();
            let stream = tokio_util::io::ReaderStream::with_capacity(file, CHUNK_SIZE);
            Ok((Box::pin(stream), len))
        }
    }
}

#[async_trait]
impl StorageTransfer for HttpTransfer {
    #[tracing::instrument(
        name = "storage.put",
        skip(self, url, source, progress),
        fields(
            http.method = "PUT",
            http.content_type = %content_type,
            upload.bytes = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn put(
        &self,
        url: &str,
        source: FileSource,
        content_type: &str,
        progress: ProgressFn,
    ) -> Result<(), UploadError> {
        let (stream, len) = open_source(source).await?;
        let span = tracing::Span::current();
        span.record("upload.bytes", len);

        let total = if len > 0 { Some(len) } else { None };
        let body = reqwest::Body::wrap_stream(ProgressStream::new(stream, total, progress));

        let mut request = self.client.put(url).header(CONTENT_LENGTH, len);

        // Storage endpoints accept the body without a content type, so an
        // unusable value only costs the header.
        match HeaderValue::from_str(content_type) {
            Ok(value) => request = request.header(CONTENT_TYPE, value),
            Err(e) => tracing::warn!(
                content_type = %content_type,
                error = %e,
                "Could not set Content-Type header, sending without it"
            ),
        }

        let response = request
            .body(body)
            .send()
            .await
            // The request URL carries the signature, keep it out of the error
            .map_err(|e| UploadError::NetworkError(e.without_url().to_string()))?;

        let status = response.status();
        span.record("http.status_code", status.as_u16());

        if status == StatusCode::OK || status == StatusCode::NO_CONTENT {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(UploadError::TransferFailed {
            status: status.as_u16(),
            body,
        })
    }
}
