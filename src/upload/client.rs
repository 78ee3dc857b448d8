//! Upload client
//!
//! Runs the upload sequence for one file at a time:
//!
//! ```text
//! select(file) ─► upload()
//!                   ├── 1. build object key
//!                   ├── 2. UrlSigner::presign          (failure → stage "signing")
//!                   ├── 3. StorageTransfer::put         (failure → stage "transfer")
//!                   │      └── progress callbacks
//!                   ├── 4. MetadataStore::save          (owner only, failure logged)
//!                   └── 5. cleanup + outcome callbacks  (every exit path)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use presign_uploadr::config::UploadConfig;
//! use presign_uploadr::signing::HttpUrlSigner;
//! use presign_uploadr::upload::{HttpTransfer, UploadClient, UploadRequest};
//! use bytes::Bytes;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let signer = HttpUrlSigner::new("http://localhost:8080/presign", Duration::from_secs(30))?;
//! let client = UploadClient::new(
//!     UploadConfig::new("my-bucket"),
//!     Arc::new(signer),
//!     Arc::new(HttpTransfer::new()?),
//! );
//! client.on_progress(|p| println!("{}%", p.percent_complete));
//!
//! let request = UploadRequest::from_bytes("hello.txt", "text/plain", Bytes::from("Hello"));
//! let outcome = client.upload(request).await;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

use super::key::ObjectKeyBuilder;
use super::progress::{ProgressFn, ProgressTracker, UploadProgress};
use super::transfer::StorageTransfer;
use super::{format_size, UploadError, UploadOutcome, UploadRequest};
use crate::config::UploadConfig;
use crate::metadata::{DiscardMetadataStore, FileMetadata, MetadataStore};
use crate::metrics;
use crate::signing::{PresignRequest, UrlSigner};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;
pub type OutcomeCallback = Arc<dyn Fn(&UploadOutcome) + Send + Sync>;

/// Kind of status message shown after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Success,
    Error,
}

/// The single message produced by an attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub kind: MessageKind,
}

impl StatusMessage {
    fn for_outcome(outcome: &UploadOutcome) -> Self {
        match outcome {
            UploadOutcome::Success { .. } => Self {
                text: "Upload successful!".to_string(),
                kind: MessageKind::Success,
            },
            UploadOutcome::Failure { error, .. } => Self {
                text: format!("Upload failed: {}", error),
                kind: MessageKind::Error,
            },
        }
    }
}

/// Snapshot of the observable client state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientState {
    pub uploading: bool,
    pub progress: UploadProgress,
    pub message: Option<StatusMessage>,
    pub file_name: Option<String>,
    pub file_size: Option<String>,
}

#[derive(Default)]
struct Inner {
    selected: Option<UploadRequest>,
    tracker: ProgressTracker,
    message: Option<StatusMessage>,
}

/// State shared with progress reporters handed to the transfer
#[derive(Default)]
struct Shared {
    inner: Mutex<Inner>,
    progress_listeners: RwLock<Vec<ProgressCallback>>,
    outcome_listeners: RwLock<Vec<OutcomeCallback>>,
}

impl Shared {
    fn report(&self, loaded: u64, total: Option<u64>) {
        let advanced = self.inner.lock().tracker.observe(loaded, total);
        self.announce(advanced);
    }

    fn complete(&self) {
        let advanced = self.inner.lock().tracker.complete();
        self.announce(advanced);
    }

    /// Notify subscribers of a tracker change, if any
    fn announce(&self, changed: Option<UploadProgress>) {
        if let Some(progress) = changed {
            self.notify_progress(progress);
        }
    }

    fn notify_progress(&self, progress: UploadProgress) {
        let listeners = self.progress_listeners.read().clone();
        for listener in listeners {
            listener(progress);
        }
    }

    fn notify_outcome(&self, outcome: &UploadOutcome) {
        let listeners = self.outcome_listeners.read().clone();
        for listener in listeners {
            listener(outcome);
        }
    }
}

/// Clears transient attempt state when dropped
struct AttemptGuard<'a> {
    uploading: &'a AtomicBool,
    shared: &'a Shared,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.shared.inner.lock().selected = None;
        self.uploading.store(false, Ordering::Release);
    }
}

/// Presigned-URL upload client
///
/// At most one attempt runs per client; [`upload`](Self::upload) called
/// while another attempt is in flight returns
/// [`UploadError::UploadInProgress`] without disturbing the running attempt.
pub struct UploadClient {
    config: UploadConfig,
    keys: ObjectKeyBuilder,
    signer: Arc<dyn UrlSigner>,
    transfer: Arc<dyn StorageTransfer>,
    metadata: Arc<dyn MetadataStore>,
    uploading: AtomicBool,
    shared: Arc<Shared>,
}

impl UploadClient {
    /// Create a client with no metadata collaborator
    pub fn new(
        config: UploadConfig,
        signer: Arc<dyn UrlSigner>,
        transfer: Arc<dyn StorageTransfer>,
    ) -> Self {
        Self {
            keys: ObjectKeyBuilder::new(&config.key_prefix),
            config,
            signer,
            transfer,
            metadata: Arc::new(DiscardMetadataStore),
            uploading: AtomicBool::new(false),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Record metadata for owned uploads through `store`
    pub fn with_metadata(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.metadata = store;
        self
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Subscribe to progress updates
    pub fn on_progress<F>(&self, callback: F)
    where
        F: Fn(UploadProgress) + Send + Sync + 'static,
    {
        self.shared.progress_listeners.write().push(Arc::new(callback));
    }

    /// Subscribe to terminal outcomes
    pub fn on_outcome<F>(&self, callback: F)
    where
        F: Fn(&UploadOutcome) + Send + Sync + 'static,
    {
        self.shared.outcome_listeners.write().push(Arc::new(callback));
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading.load(Ordering::Acquire)
    }

    /// Current observable state
    pub fn state(&self) -> ClientState {
        let inner = self.shared.inner.lock();
        ClientState {
            uploading: self.is_uploading(),
            progress: inner.tracker.current(),
            message: inner.message.clone(),
            file_name: inner.selected.as_ref().map(|r| r.file_name.clone()),
            file_size: inner.selected.as_ref().map(|r| format_size(r.size_bytes)),
        }
    }

    /// Select a file for the next [`upload_selected`](Self::upload_selected)
    pub fn select(&self, request: UploadRequest) {
        let rewound = {
            let mut inner = self.shared.inner.lock();
            inner.selected = Some(request);
            inner.message = None;
            if self.is_uploading() {
                None
            } else {
                inner.tracker.reset()
            }
        };
        self.shared.announce(rewound);
    }

    /// Clear the selection, progress and message
    ///
    /// Collaborators are not contacted. An attempt already in flight keeps
    /// running and still clears its own state when it ends.
    pub fn reset(&self) {
        let rewound = {
            let mut inner = self.shared.inner.lock();
            inner.selected = None;
            inner.message = None;
            inner.tracker.reset()
        };
        self.shared.announce(rewound);
    }

    /// Upload the currently selected file
    pub async fn upload_selected(&self) -> UploadOutcome {
        let request = self
            .shared
            .inner
            .lock()
            .selected
            .clone()
            .unwrap_or_else(UploadRequest::empty);
        self.upload(request).await
    }

    /// Upload `request` and return its terminal outcome
    ///
    /// The outcome is also delivered to every `on_outcome` subscriber.
    #[tracing::instrument(
        name = "upload.attempt",
        skip(self, request),
        fields(
            upload.file_name = %request.file_name,
            upload.bytes = request.size_bytes,
            upload.owner = ?request.owner_context,
            s3.key = tracing::field::Empty,
            upload.stage = tracing::field::Empty
        )
    )]
    pub async fn upload(&self, request: UploadRequest) -> UploadOutcome {
        if self
            .uploading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("Upload rejected: another attempt is in flight");
            return UploadOutcome::failure(UploadError::UploadInProgress);
        }

        let guard = AttemptGuard {
            uploading: &self.uploading,
            shared: &self.shared,
        };

        let rewound = {
            let mut inner = self.shared.inner.lock();
            inner.message = None;
            inner.tracker.reset()
        };
        self.shared.announce(rewound);

        let start_time = Instant::now();
        let size_bytes = request.size_bytes;

        let outcome = match self.run(request).await {
            Ok((storage_url, object_key)) => UploadOutcome::Success {
                storage_url,
                object_key,
            },
            Err(error) => UploadOutcome::failure(error),
        };

        let duration = start_time.elapsed();
        metrics::record_upload_duration(duration.as_secs_f64());

        match &outcome {
            UploadOutcome::Success {
                storage_url,
                object_key,
            } => {
                metrics::record_upload_success(size_bytes);
                tracing::info!(
                    key = %object_key,
                    url = %storage_url,
                    duration_ms = duration.as_millis(),
                    "Upload completed"
                );
            }
            UploadOutcome::Failure { stage, error } => {
                metrics::record_upload_failure(stage.as_str());
                tracing::Span::current().record("upload.stage", stage.as_str());
                tracing::error!(
                    stage = %stage,
                    error = %error,
                    duration_ms = duration.as_millis(),
                    "Upload failed"
                );
            }
        }

        self.shared.inner.lock().message = Some(StatusMessage::for_outcome(&outcome));
        drop(guard);

        self.shared.notify_outcome(&outcome);
        outcome
    }

    async fn run(&self, request: UploadRequest) -> Result<(String, String), UploadError> {
        let content_type = request.effective_content_type().to_string();
        let UploadRequest {
            file,
            file_name,
            owner_context,
            ..
        } = request;

        let file = file.ok_or(UploadError::NoFileSelected)?;

        let key = self.keys.build(owner_context.as_deref(), &file_name);
        tracing::Span::current().record("s3.key", key.as_str());

        let grant = self
            .signer
            .presign(&PresignRequest {
                bucket: self.config.bucket.clone(),
                key,
                content_type: content_type.clone(),
                expires_in: self.config.expires_in_seconds,
            })
            .await?;

        let shared = Arc::clone(&self.shared);
        let progress: ProgressFn =
            Arc::new(move |loaded: u64, total: Option<u64>| shared.report(loaded, total));

        self.transfer
            .put(&grant.url, file, &content_type, progress)
            .await?;
        self.shared.complete();

        let object_url = grant.object_url().to_string();

        if let Some(owner) = owner_context {
            let metadata = FileMetadata {
                owner_context: owner,
                file_name,
                object_key: grant.object_key.clone(),
                object_url: object_url.clone(),
            };
            if let Err(e) = self.metadata.save(&metadata).await {
                metrics::record_metadata_failure();
                tracing::warn!(
                    stage = "metadata",
                    key = %metadata.object_key,
                    error = %e,
                    "Metadata save failed"
                );
            }
        }

        Ok((object_url, grant.object_key))
    }
}
