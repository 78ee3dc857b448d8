//! Upload module
//!
//! Drives one file from selection to a stored object through a presigned URL.

use bytes::Bytes;
use std::path::PathBuf;
use thiserror::Error;

pub mod client;
pub mod key;
pub mod progress;
pub mod transfer;

pub use client::{ClientState, MessageKind, StatusMessage, UploadClient};
pub use key::ObjectKeyBuilder;
pub use progress::UploadProgress;
pub use transfer::{HttpTransfer, StorageTransfer};

/// Content type used when the caller supplies none
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("no file selected")]
    NoFileSelected,

    #[error("an upload is already in progress")]
    UploadInProgress,

    #[error("{0}")]
    SigningFailed(String),

    #[error("storage upload failed with status {status}. {body}")]
    TransferFailed { status: u16, body: String },

    #[error("network error during upload: {0}")]
    NetworkError(String),

    #[error("could not read file: {0}")]
    FileUnreadable(String),
}

impl UploadError {
    /// The step of the upload sequence that produced this error
    pub fn stage(&self) -> UploadStage {
        match self {
            UploadError::NoFileSelected
            | UploadError::UploadInProgress
            | UploadError::SigningFailed(_) => UploadStage::Signing,
            UploadError::TransferFailed { .. }
            | UploadError::NetworkError(_)
            | UploadError::FileUnreadable(_) => UploadStage::Transfer,
        }
    }
}

impl From<crate::signing::SigningError> for UploadError {
    fn from(err: crate::signing::SigningError) -> Self {
        UploadError::SigningFailed(err.to_string())
    }
}

/// Step of the upload sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadStage {
    Signing,
    Transfer,
    Metadata,
}

impl UploadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStage::Signing => "signing",
            UploadStage::Transfer => "transfer",
            UploadStage::Metadata => "metadata",
        }
    }
}

impl std::fmt::Display for UploadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary source of the file being uploaded
#[derive(Debug, Clone)]
pub enum FileSource {
    /// File contents already in memory
    Bytes(Bytes),
    /// File on local disk, streamed at transfer time
    Path(PathBuf),
}

/// A file selected for upload
///
/// Moved into the client when the upload starts, so it cannot change
/// underneath a running attempt.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file: Option<FileSource>,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub owner_context: Option<String>,
}

impl UploadRequest {
    /// Request for an in-memory file
    pub fn from_bytes(file_name: impl Into<String>, content_type: &str, body: Bytes) -> Self {
        Self {
            size_bytes: body.len() as u64,
            file: Some(FileSource::Bytes(body)),
            file_name: file_name.into(),
            content_type: content_type.to_string(),
            owner_context: None,
        }
    }

    /// Request for a file on disk
    ///
    /// The file name is taken from the last path component.
    pub async fn from_path(
        path: impl Into<PathBuf>,
        content_type: &str,
    ) -> Result<Self, UploadError> {
        let path = path.into();
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| UploadError::FileUnreadable(format!("{}: {}", path.display(), e)))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            file: Some(FileSource::Path(path)),
            file_name,
            content_type: content_type.to_string(),
            size_bytes: meta.len(),
            owner_context: None,
        })
    }

    /// A request with no file attached
    pub fn empty() -> Self {
        Self {
            file: None,
            file_name: String::new(),
            content_type: String::new(),
            size_bytes: 0,
            owner_context: None,
        }
    }

    /// Associate the upload with an owning record
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner_context = Some(owner.into());
        self
    }

    /// Content type to sign and send, falling back to `application/octet-stream`
    pub fn effective_content_type(&self) -> &str {
        if self.content_type.trim().is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            &self.content_type
        }
    }
}

/// Terminal result of one upload attempt
#[derive(Debug)]
pub enum UploadOutcome {
    Success {
        storage_url: String,
        object_key: String,
    },
    Failure {
        stage: UploadStage,
        error: UploadError,
    },
}

impl UploadOutcome {
    pub fn failure(error: UploadError) -> Self {
        UploadOutcome::Failure {
            stage: error.stage(),
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Success { .. })
    }

    /// Human-readable failure reason, `None` on success
    pub fn reason(&self) -> Option<String> {
        match self {
            UploadOutcome::Success { .. } => None,
            UploadOutcome::Failure { error, .. } => Some(error.to_string()),
        }
    }

    pub fn stage(&self) -> Option<UploadStage> {
        match self {
            UploadOutcome::Success { .. } => None,
            UploadOutcome::Failure { stage, .. } => Some(*stage),
        }
    }
}

/// Format a byte count for display, using 1024-based units
///
/// ```
/// use presign_uploadr::upload::format_size;
///
/// assert_eq!(format_size(512), "512 B");
/// assert_eq!(format_size(2 * 1024 * 1024), "2.0 MB");
/// ```
pub fn format_size(bytes: u64) -> String {
    const THRESH: f64 = 1024.0;
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];

    if (bytes as f64) < THRESH {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    value /= THRESH;
    while value >= THRESH && unit < UNITS.len() - 1 {
        value /= THRESH;
        unit += 1;
    }

    format!("{:.1} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024), "5.0 GB");
        // GB is the largest unit
        assert_eq!(format_size(2048 * 1024 * 1024 * 1024), "2048.0 GB");
    }

    #[test]
    fn test_error_stages() {
        assert_eq!(UploadError::NoFileSelected.stage(), UploadStage::Signing);
        assert_eq!(
            UploadError::SigningFailed("x".into()).stage(),
            UploadStage::Signing
        );
        assert_eq!(
            UploadError::TransferFailed {
                status: 403,
                body: String::new()
            }
            .stage(),
            UploadStage::Transfer
        );
        assert_eq!(
            UploadError::NetworkError("reset".into()).stage(),
            UploadStage::Transfer
        );
    }

    #[test]
    fn test_transfer_failed_message_carries_body() {
        let err = UploadError::TransferFailed {
            status: 403,
            body: "<Code>AccessDenied</Code>".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("403"));
        assert!(msg.contains("AccessDenied"));
    }

    #[test]
    fn test_effective_content_type() {
        let mut request = UploadRequest::from_bytes("a.bin", "", Bytes::from_static(b"x"));
        assert_eq!(request.effective_content_type(), DEFAULT_CONTENT_TYPE);
        request.content_type = "image/png".into();
        assert_eq!(request.effective_content_type(), "image/png");
    }

    #[test]
    fn test_outcome_reason() {
        let outcome = UploadOutcome::failure(UploadError::NoFileSelected);
        assert_eq!(outcome.stage(), Some(UploadStage::Signing));
        assert_eq!(outcome.reason().as_deref(), Some("no file selected"));
        assert!(!outcome.is_success());
    }
}
