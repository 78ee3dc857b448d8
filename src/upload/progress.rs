//! Upload progress tracking
//!
//! [`ProgressStream`] counts bytes as the HTTP client pulls them from the
//! body; [`ProgressTracker`] turns byte counts into a percentage that never
//! goes backwards within one attempt.

use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Callback receiving `(bytes_sent, total_bytes)`; `total_bytes` is `None`
/// when the length is unknown
pub type ProgressFn = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Percentage of the current attempt that has been sent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct UploadProgress {
    pub percent_complete: u8,
}

impl UploadProgress {
    pub const DONE: UploadProgress = UploadProgress {
        percent_complete: 100,
    };

    /// `floor(loaded / total * 100)`, capped at 100; zero when `total` is unknown
    pub fn from_bytes(loaded: u64, total: Option<u64>) -> Self {
        let percent = match total {
            Some(total) if total > 0 => {
                ((loaded as u128 * 100) / total as u128).min(100) as u8
            }
            _ => 0,
        };
        Self {
            percent_complete: percent,
        }
    }
}

/// Monotonic progress for a single attempt
#[derive(Debug, Default)]
pub struct ProgressTracker {
    current: UploadProgress,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> UploadProgress {
        self.current
    }

    /// Start a new attempt at 0%; returns the new value only when it moved back
    pub fn reset(&mut self) -> Option<UploadProgress> {
        let previous = std::mem::take(&mut self.current);
        if previous > self.current {
            Some(self.current)
        } else {
            None
        }
    }

    /// Record a byte count; returns the new value only when it moved forward
    pub fn observe(&mut self, loaded: u64, total: Option<u64>) -> Option<UploadProgress> {
        self.advance(UploadProgress::from_bytes(loaded, total))
    }

    /// Mark the transfer as finished
    pub fn complete(&mut self) -> Option<UploadProgress> {
        self.advance(UploadProgress::DONE)
    }

    fn advance(&mut self, next: UploadProgress) -> Option<UploadProgress> {
        if next > self.current {
            self.current = next;
            Some(next)
        } else {
            None
        }
    }
}

pin_project! {
    /// Body stream wrapper that reports cumulative bytes after each chunk
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        loaded: u64,
        total: Option<u64>,
        report: ProgressFn,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, total: Option<u64>, report: ProgressFn) -> Self {
        Self {
            inner,
            loaded: 0,
            total,
            report,
        }
    }
}

impl<S, E> Stream for ProgressStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                *this.loaded += chunk.len() as u64;
                (this.report)(*this.loaded, *this.total);
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }
}
