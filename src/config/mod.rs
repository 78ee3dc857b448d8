//! Configuration module for Presign Uploadr
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("MY_VAR", "value");
/// let result = expand_env_vars("prefix-${MY_VAR}-suffix");
/// assert_eq!(result, "prefix-value-suffix");
///
/// let result = expand_env_vars("${MISSING:-default}");
/// assert_eq!(result, "default");
/// ```
pub(crate) fn expand_env_vars(s: &str) -> String {
    let re = env_var_pattern();
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);

    result
}

fn env_var_pattern() -> &'static regex_lite::Regex {
    static PATTERN: std::sync::OnceLock<regex_lite::Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| {
        regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var pattern is a valid regex")
    })
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Longest expiry S3 accepts for a presigned URL (7 days)
pub const MAX_EXPIRES_IN_SECONDS: u64 = 604_800;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
///
/// Every section is optional on load. `upload` and `signing` are only
/// required to build an upload client, see [`Config::client_settings`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub upload: Option<UploadConfig>,
    #[serde(default)]
    pub signing: Option<SigningConfig>,
    #[serde(default)]
    pub metadata: Option<MetadataConfig>,
    #[serde(default)]
    pub presign_server: Option<PresignServerConfig>,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// The `upload` and `signing` sections, which the upload client needs
    pub fn client_settings(&self) -> Result<(&UploadConfig, &SigningConfig), ConfigError> {
        let upload = self.upload.as_ref().ok_or_else(|| {
            ConfigError::ValidationError("upload section is required to upload".into())
        })?;
        let signing = self.signing.as_ref().ok_or_else(|| {
            ConfigError::ValidationError("signing section is required to upload".into())
        })?;
        Ok((upload, signing))
    }

    /// Validate the configuration
    ///
    /// Only the sections that are present are checked.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref upload) = self.upload {
            if upload.bucket.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "upload.bucket cannot be empty".into(),
                ));
            }

            if upload.key_prefix.trim_matches('/').is_empty() {
                return Err(ConfigError::ValidationError(
                    "upload.key_prefix cannot be empty".into(),
                ));
            }

            if upload.expires_in_seconds == 0 || upload.expires_in_seconds > MAX_EXPIRES_IN_SECONDS
            {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid expires_in_seconds {}: must be between 1 and {}",
                    upload.expires_in_seconds, MAX_EXPIRES_IN_SECONDS
                )));
            }
        }

        if let Some(ref signing) = self.signing {
            if !is_valid_http_url(&signing.url) {
                return Err(ConfigError::ValidationError(
                    "Invalid signing url: must start with http:// or https://".into(),
                ));
            }
        }

        if let Some(ref metadata) = self.metadata {
            if !is_valid_http_url(&metadata.url) {
                return Err(ConfigError::ValidationError(
                    "Invalid metadata url: must start with http:// or https://".into(),
                ));
            }
        }

        if let Some(ref server) = self.presign_server {
            if server.address.parse::<std::net::SocketAddr>().is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid presign_server address '{}'",
                    server.address
                )));
            }

            if let Some(ref endpoint) = server.endpoint {
                if !is_valid_http_url(endpoint) {
                    return Err(ConfigError::ValidationError(
                        "Invalid presign_server endpoint: must start with http:// or https://"
                            .into(),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Upload configuration
///
/// These values are fixed for the lifetime of a client and are never
/// renegotiated mid-upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Target bucket name. Supports ${VAR} and ${VAR:-default} expansion.
    pub bucket: String,
    /// Namespace prepended to every object key. Default: "uploads"
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Lifetime requested for each presigned URL. Default: 600
    #[serde(default = "default_expires_in")]
    pub expires_in_seconds: u64,
}

impl UploadConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key_prefix: default_key_prefix(),
            expires_in_seconds: default_expires_in(),
        }
    }
}

fn default_key_prefix() -> String {
    "uploads".to_string()
}

fn default_expires_in() -> u64 {
    600
}

/// URL-signing service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    pub url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

/// Metadata service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    pub url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    30
}

/// Presign service configuration
///
/// Empty allowlists accept every bucket and every key.
///
/// # Example
///
/// ```yaml
/// presign_server:
///   address: "0.0.0.0:8080"
///   region: "us-east-1"
///   endpoint: "http://localhost:9000"  # Optional, S3-compatible stores
///   allowed_buckets: ["my-bucket"]
///   allowed_key_prefixes: ["uploads/"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignServerConfig {
    #[serde(default = "default_server_address")]
    pub address: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub allowed_buckets: Vec<String>,
    #[serde(default)]
    pub allowed_key_prefixes: Vec<String>,
}

impl Default for PresignServerConfig {
    fn default() -> Self {
        Self {
            address: default_server_address(),
            region: default_region(),
            endpoint: None,
            allowed_buckets: Vec::new(),
            allowed_key_prefixes: Vec::new(),
        }
    }
}

fn default_server_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}
