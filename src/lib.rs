//! vidup library - resumable video uploads with retry and backoff

pub mod account;
pub mod config;
pub mod http_logger;
pub mod output;
pub mod upload;

// Re-export commonly used types
pub use account::{AccountStore, CredentialError};
pub use config::{Config, ConfigOptions};
pub use output::Envelope;
pub use upload::{DriverError, Outcome, RetryPolicy, UploadDriver};
