//! Configuration module - CLI arguments and settings

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::upload::{ChunkSize, RetryPolicy, DEFAULT_UPLOAD_URL};

/// Environment variable overriding the upload endpoint
pub const ENV_UPLOAD_URL: &str = "VIDUP_UPLOAD_URL";

/// Environment variable overriding the credential directory
pub const ENV_ACCOUNTS_DIR: &str = "VIDUP_ACCOUNTS_DIR";

pub const DEFAULT_ACCOUNTS_DIR: &str = "accounts";

/// MIME type announced for the uploaded file
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Optional configuration parameters for Config::new()
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub upload_url: Option<String>,
    pub accounts_dir: Option<PathBuf>,
    pub max_retries: Option<u32>,
    pub chunk_size: Option<u64>,
    pub mime_type: Option<String>,
}

impl ConfigOptions {
    /// Options taken from environment variables
    pub fn from_env() -> Self {
        Self {
            upload_url: env_non_empty(ENV_UPLOAD_URL),
            accounts_dir: env_non_empty(ENV_ACCOUNTS_DIR).map(PathBuf::from),
            ..Default::default()
        }
    }

    /// Fill unset fields from `fallback`
    pub fn or(self, fallback: ConfigOptions) -> Self {
        Self {
            upload_url: self.upload_url.or(fallback.upload_url),
            accounts_dir: self.accounts_dir.or(fallback.accounts_dir),
            max_retries: self.max_retries.or(fallback.max_retries),
            chunk_size: self.chunk_size.or(fallback.chunk_size),
            mime_type: self.mime_type.or(fallback.mime_type),
        }
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub upload_url: String,
    pub accounts_dir: PathBuf,
    pub retry: RetryPolicy,
    pub chunk_size: ChunkSize,
    pub mime_type: String,
}

impl Config {
    pub fn new(options: ConfigOptions) -> Result<Arc<Self>> {
        let upload_url = options
            .upload_url
            .unwrap_or_else(|| DEFAULT_UPLOAD_URL.to_string());
        let upload_url = upload_url.trim().trim_end_matches('/').to_string();
        if upload_url.is_empty() {
            return Err(anyhow!("upload_url cannot be empty"));
        }
        if !upload_url.starts_with("https://") && !upload_url.starts_with("http://") {
            return Err(anyhow!(
                "upload_url must be an http(s) URL, got {:?}",
                upload_url
            ));
        }

        let chunk_size = match options.chunk_size {
            None => ChunkSize::Unbounded,
            Some(n) => ChunkSize::bytes(n)?,
        };

        let mut retry = RetryPolicy::default();
        if let Some(max_retries) = options.max_retries {
            retry = retry.with_max_retries(max_retries);
        }

        let mime_type = options
            .mime_type
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

        Ok(Arc::new(Self {
            upload_url,
            accounts_dir: options
                .accounts_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ACCOUNTS_DIR)),
            retry,
            chunk_size,
            mime_type,
        }))
    }
}
