//! Chunked, resumable video upload

pub mod backoff;
pub mod classify;
pub mod driver;
pub mod metadata;
pub mod session;

// Re-export commonly used items
pub use backoff::{Backoff, ExponentialJitter, Sleeper, ThreadSleeper};
pub use classify::{
    ErrorClass, FaultKind, RetryPolicy, TransportError, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRIABLE_STATUSES,
};
pub use driver::{
    ChunkResult, ChunkTransport, DriverError, Outcome, RemoteObject, RetryState, UploadDriver,
};
pub use metadata::{parse_keywords, VideoMetadata};
pub use session::{
    build_client, ChunkSize, InvalidChunkSize, ResumableSession, StaticToken, TokenSource,
    UploadRequest, CHUNK_GRANULARITY, DEFAULT_UPLOAD_URL,
};
