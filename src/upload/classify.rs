//! Transport error taxonomy and the retry classification policy

use thiserror::Error;

/// Default maximum number of retries for a whole transfer
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// HTTP statuses that are always worth another attempt
pub const DEFAULT_RETRIABLE_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// Transport-level failures below the HTTP status layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Peer reset the connection
    ConnectionReset,
    /// Response body ended before the announced length
    IncompleteRead,
    /// Connection could not be established
    NotConnected,
    /// Request could not be sent
    CannotSendRequest,
    /// Request headers could not be sent
    CannotSendHeader,
    /// No response arrived
    ResponseNotReady,
    /// Malformed HTTP status line
    BadStatusLine,
    /// Any other I/O failure, local file reads included
    Io,
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionReset => write!(f, "connection reset"),
            Self::IncompleteRead => write!(f, "incomplete read"),
            Self::NotConnected => write!(f, "not connected"),
            Self::CannotSendRequest => write!(f, "cannot send request"),
            Self::CannotSendHeader => write!(f, "cannot send header"),
            Self::ResponseNotReady => write!(f, "response not ready"),
            Self::BadStatusLine => write!(f, "bad status line"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

/// Error produced by a single chunk call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("{kind}: {message}")]
    Fault { kind: FaultKind, message: String },

    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    /// A request that can never be built (bad URL, bad header value)
    #[error("invalid request: {0}")]
    Invalid(String),

    /// No usable access token for the request
    #[error("credential error: {0}")]
    Credential(String),
}

impl TransportError {
    pub fn fault(kind: FaultKind, message: impl Into<String>) -> Self {
        Self::Fault {
            kind,
            message: message.into(),
        }
    }

    pub fn status(code: u16, body: impl Into<String>) -> Self {
        Self::Status {
            code,
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retriable,
    NonRetriable,
}

/// Retry budget and the set of retriable HTTP statuses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retriable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retriable_statuses: DEFAULT_RETRIABLE_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Map a transport error onto the retry decision
    pub fn classify(&self, error: &TransportError) -> ErrorClass {
        match error {
            TransportError::Fault { .. } => ErrorClass::Retriable,
            TransportError::Status { code, .. } if self.retriable_statuses.contains(code) => {
                ErrorClass::Retriable
            }
            TransportError::Status { .. }
            | TransportError::Invalid(_)
            | TransportError::Credential(_) => ErrorClass::NonRetriable,
        }
    }

    /// Describe a retriable failure for `RetryState::last_error`
    pub fn describe(&self, error: &TransportError) -> String {
        match error {
            TransportError::Status { code, body } => {
                format!("A retriable HTTP error {} occurred:\n{}", code, body)
            }
            other => format!("A retriable error occurred: {}", other),
        }
    }
}
