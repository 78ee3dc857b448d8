//! Presign Uploadr Library
//!
//! Direct-to-storage file uploads through presigned PUT URLs.
//!
//! # Features
//!
//! - **Direct Upload**: File bytes go straight to object storage, never through the backend
//! - **Progress**: Monotonic percentage callbacks while the body streams
//! - **Best-Effort Metadata**: Upload records are saved without risking the upload outcome
//! - **Presign Service**: Optional HTTP service that signs S3 PUT URLs behind allowlists
//!
//! # Example
//!
//! ```no_run
//! use presign_uploadr::config::Config;
//! use presign_uploadr::signing::HttpUrlSigner;
//! use presign_uploadr::upload::{HttpTransfer, UploadClient, UploadRequest};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let (upload, signing) = config.client_settings()?;
//!     let signer = HttpUrlSigner::new(&signing.url, Duration::from_secs(signing.timeout_seconds))?;
//!     let client = UploadClient::new(
//!         upload.clone(),
//!         Arc::new(signer),
//!         Arc::new(HttpTransfer::new()?),
//!     );
//!
//!     let request = UploadRequest::from_path("report.pdf", "application/pdf").await?;
//!     let outcome = client.upload(request.with_owner("rec123")).await;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod metadata;
pub mod metrics;
pub mod presign;
pub mod server;
pub mod signing;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use upload::{UploadClient, UploadError, UploadOutcome, UploadRequest, UploadStage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
