//! Resumable transfer driver
//!
//! Advances a chunked upload until the remote side returns the created
//! object, absorbing transient failures with jittered exponential backoff.
//! The transport keeps the byte offset, so every retry resumes where the
//! last acknowledged chunk ended.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::backoff::{Backoff, ExponentialJitter, Sleeper, ThreadSleeper};
use super::classify::{ErrorClass, RetryPolicy, TransportError};

/// Status reported when the completed object carries no upload status
pub const UNKNOWN_STATUS: &str = "unknown";

/// Response payload of a completed transfer
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObject(Value);

impl RemoteObject {
    pub fn new(body: Value) -> Self {
        Self(body)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    /// `status.uploadStatus` of the created video
    pub fn upload_status(&self) -> Option<&str> {
        self.0
            .get("status")
            .and_then(|s| s.get("uploadStatus"))
            .and_then(Value::as_str)
    }

    pub fn body(&self) -> &Value {
        &self.0
    }
}

/// Result of one chunk call
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkResult {
    /// Chunk accepted, more bytes expected
    Progress { bytes_sent: u64, total: u64 },
    Complete(RemoteObject),
}

/// A chunked upload in progress
///
/// Implementations own the offset into the source and must resume from the
/// last acknowledged byte after returning an error.
pub trait ChunkTransport {
    fn next_chunk(&mut self) -> Result<ChunkResult, TransportError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    pub attempt_count: u32,
    pub last_error: Option<String>,
}

/// Terminal result of a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success { remote_id: String, status: String },
    Failure { reason: String },
}

/// Conditions that end a transfer without an `Outcome`
#[derive(Debug, Error)]
pub enum DriverError {
    /// Remote rejected the transfer with a non-retriable error
    #[error("{0}")]
    Rejected(TransportError),

    /// Retry budget spent; callers treat this as an abort, not a failure
    #[error("No longer attempting to retry. ({attempts} attempts, last error: {last_error})")]
    RetriesExhausted { attempts: u32, last_error: String },
}

/// Drives one transfer to completion
pub struct UploadDriver<B = ExponentialJitter, S = ThreadSleeper> {
    policy: RetryPolicy,
    backoff: B,
    sleeper: S,
    state: RetryState,
}

impl UploadDriver {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_parts(policy, ExponentialJitter::new(), ThreadSleeper)
    }
}

impl<B: Backoff, S: Sleeper> UploadDriver<B, S> {
    pub fn with_parts(policy: RetryPolicy, backoff: B, sleeper: S) -> Self {
        Self {
            policy,
            backoff,
            sleeper,
            state: RetryState::default(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Retry bookkeeping of the most recent run
    pub fn state(&self) -> &RetryState {
        &self.state
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Run the transfer until it completes, is rejected, or runs out of retries
    pub fn run<T: ChunkTransport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<Outcome, DriverError> {
        self.state = RetryState::default();

        loop {
            let error = match transport.next_chunk() {
                Ok(ChunkResult::Progress { bytes_sent, total }) => {
                    debug!("Uploaded {}/{} bytes", bytes_sent, total);
                    continue;
                }
                Ok(ChunkResult::Complete(object)) => return Ok(self.finish(object)),
                Err(e) => e,
            };

            if self.policy.classify(&error) == ErrorClass::NonRetriable {
                error!("Upload rejected: {}", error);
                return Err(DriverError::Rejected(error));
            }

            let message = self.policy.describe(&error);
            self.state.attempt_count += 1;
            self.state.last_error = Some(message.clone());

            if self.state.attempt_count > self.policy.max_retries {
                error!(
                    "Retry budget of {} exhausted: {}",
                    self.policy.max_retries, message
                );
                return Err(DriverError::RetriesExhausted {
                    attempts: self.state.attempt_count,
                    last_error: message,
                });
            }

            let delay = self.backoff.delay(self.state.attempt_count);
            warn!(
                "{} (retry {}/{}), sleeping {:.3}s",
                message,
                self.state.attempt_count,
                self.policy.max_retries,
                delay.as_secs_f64()
            );
            self.sleeper.sleep(delay);
        }
    }

    fn finish(&self, object: RemoteObject) -> Outcome {
        match object.id() {
            Some(id) => {
                let status = object.upload_status().unwrap_or(UNKNOWN_STATUS);
                info!("Upload complete: id={} status={}", id, status);
                Outcome::Success {
                    remote_id: id.to_string(),
                    status: status.to_string(),
                }
            }
            None => {
                warn!("Upload finished without an id: {}", object.body());
                Outcome::Failure {
                    reason: format!("unexpected response shape: {}", object.body()),
                }
            }
        }
    }
}
