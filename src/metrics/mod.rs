//! Metrics module
//!
//! Provides Prometheus metrics for uploads and the presign service.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "presign_uploadr_uploads_total",
        "Total number of upload attempts",
        &["status"]
    ).unwrap();

    pub static ref UPLOAD_FAILURES: CounterVec = register_counter_vec!(
        "presign_uploadr_upload_failures_total",
        "Failed upload attempts by stage",
        &["stage"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "presign_uploadr_upload_bytes_total",
        "Total bytes uploaded"
    ).unwrap();

    pub static ref UPLOAD_DURATION: Histogram = register_histogram!(
        "presign_uploadr_upload_duration_seconds",
        "Upload duration in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
    ).unwrap();

    pub static ref METADATA_FAILURES: Counter = register_counter!(
        "presign_uploadr_metadata_failures_total",
        "Metadata saves that failed after a successful transfer"
    ).unwrap();

    // Presign service metrics
    pub static ref PRESIGN_REQUESTS: CounterVec = register_counter_vec!(
        "presign_uploadr_presign_requests_total",
        "Presign requests handled by status code",
        &["status"]
    ).unwrap();
}

/// Record a successful upload
pub fn record_upload_success(bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&["success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed upload
pub fn record_upload_failure(stage: &str) {
    UPLOADS_TOTAL.with_label_values(&["failure"]).inc();
    UPLOAD_FAILURES.with_label_values(&[stage]).inc();
}

/// Record upload duration
pub fn record_upload_duration(duration_secs: f64) {
    UPLOAD_DURATION.observe(duration_secs);
}

/// Record a swallowed metadata failure
pub fn record_metadata_failure() {
    METADATA_FAILURES.inc();
}

/// Record a presign response
pub fn record_presign_request(status: u16) {
    PRESIGN_REQUESTS
        .with_label_values(&[status.to_string().as_str()])
        .inc();
}

/// Render all registered metrics in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
