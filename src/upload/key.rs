//! Object key generation
//!
//! Keys have the shape `{prefix}/{owner}/{timestamp}_{file_name}`. The
//! timestamp is milliseconds since the Unix epoch and strictly increases
//! across every key issued in this process, so keys are unique without a
//! collision check.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Owner segment used when the upload has no owning record
pub const ANONYMOUS_OWNER: &str = "anonymous";

static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

/// Next timestamp, never equal to or lower than one already issued
fn next_stamp() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_STAMP.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`
pub fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "file".to_string()
    } else {
        sanitized
    }
}

/// Builds object keys under a fixed namespace prefix
#[derive(Debug, Clone)]
pub struct ObjectKeyBuilder {
    prefix: String,
}

impl ObjectKeyBuilder {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build a fresh key for `file_name` owned by `owner`
    pub fn build(&self, owner: Option<&str>, file_name: &str) -> String {
        self.build_at(next_stamp(), owner, file_name)
    }

    fn build_at(&self, stamp: u64, owner: Option<&str>, file_name: &str) -> String {
        let owner = match owner.map(str::trim) {
            Some(o) if !o.is_empty() => sanitize_file_name(o),
            _ => ANONYMOUS_OWNER.to_string(),
        };

        format!(
            "{}/{}/{}_{}",
            self.prefix,
            owner,
            stamp,
            sanitize_file_name(file_name)
        )
    }
}
