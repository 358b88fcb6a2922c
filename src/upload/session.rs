//! Resumable upload session over blocking HTTP
//!
//! Protocol:
//! 1. POST the metadata with `uploadType=resumable`; the `Location` header
//!    of the response is the session URI.
//! 2. PUT byte ranges to the session URI. `308` means the range was
//!    accepted and more is expected, `200`/`201` carries the created object.
//! 3. After a failure, PUT an empty body with `Content-Range: bytes */N`
//!    to learn how many bytes the server holds, then continue from there.

use std::error::Error as _;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Instant;

use reqwest::blocking::{Body, Client, RequestBuilder};
use reqwest::header::{HeaderMap, CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::classify::{FaultKind, TransportError};
use super::driver::{ChunkResult, ChunkTransport, RemoteObject};
use crate::http_logger::{self, HttpResponseLog};

/// Chunk sizes must be multiples of this, except for the final chunk
pub const CHUNK_GRANULARITY: u64 = 256 * 1024;

/// Default endpoint for video inserts
pub const DEFAULT_UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";

/// Resource parts set by the insert request
const INSERT_PARTS: &str = "snippet,status";

/// HTTP 308, "Resume Incomplete" in the resumable protocol
const RESUME_INCOMPLETE: u16 = 308;

const UNAUTHORIZED: u16 = 401;

const USER_AGENT: &str = concat!("vidup/", env!("CARGO_PKG_VERSION"));

/// How many bytes each PUT carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkSize {
    /// Whole remainder of the file in one request
    #[default]
    Unbounded,
    Bytes(u64),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("chunk size must be a non-zero multiple of {granularity} bytes, got {got}")]
pub struct InvalidChunkSize {
    pub got: u64,
    pub granularity: u64,
}

impl ChunkSize {
    pub fn bytes(n: u64) -> Result<Self, InvalidChunkSize> {
        if n == 0 || n % CHUNK_GRANULARITY != 0 {
            return Err(InvalidChunkSize {
                got: n,
                granularity: CHUNK_GRANULARITY,
            });
        }
        Ok(Self::Bytes(n))
    }

    fn len(self, remaining: u64) -> u64 {
        match self {
            Self::Unbounded => remaining,
            Self::Bytes(n) => n.min(remaining),
        }
    }
}

/// Everything needed to start a resumable upload
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub endpoint: String,
    pub metadata: Value,
    pub file: PathBuf,
    pub mime_type: String,
    pub chunk_size: ChunkSize,
}

/// HTTP client for upload sessions; chunk calls carry no timeout
///
/// Redirects stay off: `308` is the protocol's progress signal.
pub fn build_client() -> reqwest::Result<Client> {
    Client::builder()
        .timeout(None)
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(USER_AGENT)
        .build()
}

struct Exchange {
    status: u16,
    headers: HeaderMap,
    body: String,
}

/// Supplies the bearer token for session requests
pub trait TokenSource {
    /// Token for the next request, refreshed first when it has expired
    fn access_token(&mut self) -> Result<String, TransportError>;

    /// Replace a token the server answered with `401`
    fn refresh(&mut self) -> Result<String, TransportError>;
}

/// A fixed access token with no way to refresh it
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenSource for StaticToken {
    fn access_token(&mut self) -> Result<String, TransportError> {
        Ok(self.0.clone())
    }

    fn refresh(&mut self) -> Result<String, TransportError> {
        Err(TransportError::Credential(
            "static access token cannot be refreshed".to_string(),
        ))
    }
}

/// One in-flight upload against a session URI
pub struct ResumableSession {
    client: Client,
    tokens: Box<dyn TokenSource>,
    request: UploadRequest,
    total: u64,
    session_uri: Option<String>,
    offset: u64,
    needs_resync: bool,
}

impl ResumableSession {
    pub fn new(
        client: Client,
        tokens: impl TokenSource + 'static,
        request: UploadRequest,
    ) -> std::io::Result<Self> {
        let total = std::fs::metadata(&request.file)?.len();
        Ok(Self {
            client,
            tokens: Box::new(tokens),
            request,
            total,
            session_uri: None,
            offset: 0,
            needs_resync: false,
        })
    }

    /// Bytes the server has acknowledged so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn session_uri(&self) -> Option<&str> {
        self.session_uri.as_deref()
    }

    fn advance(&mut self) -> Result<ChunkResult, TransportError> {
        let uri = match &self.session_uri {
            Some(uri) => uri.clone(),
            None => {
                let uri = self.initiate()?;
                self.session_uri = Some(uri.clone());
                uri
            }
        };

        if self.needs_resync {
            if let ChunkResult::Complete(object) = self.query_offset(&uri)? {
                return Ok(ChunkResult::Complete(object));
            }
            self.needs_resync = false;
        }

        self.send_chunk(&uri)
    }

    fn initiate(&mut self) -> Result<String, TransportError> {
        let metadata = self.request.metadata.to_string();
        info!(
            "Starting resumable upload of {} ({} bytes)",
            self.request.file.display(),
            self.total
        );

        let (client, request, total) = (&self.client, &self.request, self.total);
        let exchange = send_authorized(&mut *self.tokens, |token| {
            let log = http_logger::build_request_log_if_enabled(
                "POST",
                &request.endpoint,
                &[
                    ("Content-Type", "application/json; charset=UTF-8".to_string()),
                    ("X-Upload-Content-Type", request.mime_type.clone()),
                    ("X-Upload-Content-Length", total.to_string()),
                    ("Authorization", format!("Bearer {}", token)),
                ],
                Some(metadata.as_str()),
            );

            let builder = client
                .post(&request.endpoint)
                .query(&[("uploadType", "resumable"), ("part", INSERT_PARTS)])
                .bearer_auth(token)
                .header(CONTENT_TYPE, "application/json; charset=UTF-8")
                .header("X-Upload-Content-Type", &request.mime_type)
                .header("X-Upload-Content-Length", total)
                .body(metadata.clone());

            execute(builder, log)
        })?;

        if !(200..300).contains(&exchange.status) {
            return Err(TransportError::status(exchange.status, exchange.body));
        }

        let uri = exchange
            .headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                TransportError::Invalid("upload session response has no Location header".into())
            })?;
        debug!("Upload session: {}", uri);
        Ok(uri.to_string())
    }

    /// Ask the server how much of the file it already holds
    fn query_offset(&mut self, uri: &str) -> Result<ChunkResult, TransportError> {
        let content_range = format!("bytes */{}", self.total);
        let client = &self.client;
        let exchange = send_authorized(&mut *self.tokens, |token| {
            let log = http_logger::build_request_log_if_enabled(
                "PUT",
                uri,
                &[
                    ("Content-Range", content_range.clone()),
                    ("Authorization", format!("Bearer {}", token)),
                ],
                None,
            );

            let builder = client
                .put(uri)
                .bearer_auth(token)
                .header(CONTENT_RANGE, &content_range)
                .body(Vec::new());

            execute(builder, log)
        })?;

        let result = self.handle_response(exchange)?;
        if let ChunkResult::Progress { bytes_sent, .. } = result {
            info!("Resuming upload at byte {}", bytes_sent);
        }
        Ok(result)
    }

    fn send_chunk(&mut self, uri: &str) -> Result<ChunkResult, TransportError> {
        let (offset, total) = (self.offset, self.total);
        let len = self.request.chunk_size.len(total.saturating_sub(offset));
        let content_range = if len == 0 {
            format!("bytes */{}", total)
        } else {
            format!("bytes {}-{}/{}", offset, offset + len - 1, total)
        };

        let (client, request) = (&self.client, &self.request);
        let exchange = send_authorized(&mut *self.tokens, |token| {
            let mut file = File::open(&request.file).map_err(io_fault)?;
            file.seek(SeekFrom::Start(offset)).map_err(io_fault)?;

            let log = http_logger::build_request_log_if_enabled(
                "PUT",
                uri,
                &[
                    ("Content-Type", request.mime_type.clone()),
                    ("Content-Range", content_range.clone()),
                    ("Authorization", format!("Bearer {}", token)),
                ],
                Some(format!("<{} bytes of {}>", len, request.file.display()).as_str()),
            );

            let builder = client
                .put(uri)
                .bearer_auth(token)
                .header(CONTENT_TYPE, &request.mime_type)
                .header(CONTENT_RANGE, &content_range)
                .body(Body::sized(file.take(len), len));

            execute(builder, log)
        })?;

        self.handle_response(exchange)
    }

    fn handle_response(&mut self, exchange: Exchange) -> Result<ChunkResult, TransportError> {
        match exchange.status {
            RESUME_INCOMPLETE => {
                let acknowledged = exchange
                    .headers
                    .get(RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_range_end)
                    .map(|end| end.saturating_add(1))
                    .unwrap_or(0);
                if acknowledged > self.total {
                    return Err(TransportError::Invalid(format!(
                        "server acknowledged {} bytes of {}",
                        acknowledged, self.total
                    )));
                }
                self.offset = acknowledged;
                Ok(ChunkResult::Progress {
                    bytes_sent: self.offset,
                    total: self.total,
                })
            }
            200 | 201 => {
                self.offset = self.total;
                let body = serde_json::from_str(&exchange.body)
                    .unwrap_or(Value::String(exchange.body));
                Ok(ChunkResult::Complete(RemoteObject::new(body)))
            }
            code => Err(TransportError::status(code, exchange.body)),
        }
    }
}

impl ChunkTransport for ResumableSession {
    fn next_chunk(&mut self) -> Result<ChunkResult, TransportError> {
        let result = self.advance();
        if result.is_err() && self.session_uri.is_some() {
            self.needs_resync = true;
        }
        result
    }
}

/// Send a request, refreshing the token once if the server answers `401`
///
/// The repeat does not count against the retry budget.
fn send_authorized<F>(
    tokens: &mut dyn TokenSource,
    mut send: F,
) -> Result<Exchange, TransportError>
where
    F: FnMut(&str) -> Result<Exchange, TransportError>,
{
    let token = tokens.access_token()?;
    let exchange = send(&token)?;
    if exchange.status != UNAUTHORIZED {
        return Ok(exchange);
    }

    match tokens.refresh() {
        Ok(token) => {
            info!("Access token rejected, repeating request with a refreshed token");
            send(&token)
        }
        Err(e) => {
            warn!("Access token rejected and could not be refreshed: {}", e);
            Ok(exchange)
        }
    }
}

fn execute(
    builder: RequestBuilder,
    log: Option<http_logger::HttpRequestLog>,
) -> Result<Exchange, TransportError> {
    let start = Instant::now();
    let result = builder.send().and_then(|response| {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        response.text().map(|body| Exchange {
            status,
            headers,
            body,
        })
    });
    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(exchange) => {
            if let Some(request) = &log {
                let response = HttpResponseLog {
                    status: exchange.status,
                    headers: http_logger::header_pairs(&exchange.headers),
                    body: Some(exchange.body.clone()),
                };
                http_logger::log_request(request, Some(&response), duration_ms, None);
            }
            Ok(exchange)
        }
        Err(e) => {
            if let Some(request) = &log {
                http_logger::log_request(request, None, duration_ms, Some(&e.to_string()));
            }
            Err(map_reqwest_error(e))
        }
    }
}

/// Last acknowledged byte from a `Range: bytes=0-N` header
pub fn parse_range_end(value: &str) -> Option<u64> {
    let range = value.trim().strip_prefix("bytes=")?;
    let (_, end) = range.split_once('-')?;
    end.trim().parse().ok()
}

fn io_fault(e: std::io::Error) -> TransportError {
    let kind = match e.kind() {
        std::io::ErrorKind::ConnectionReset => FaultKind::ConnectionReset,
        _ => FaultKind::Io,
    };
    TransportError::fault(kind, e.to_string())
}

/// Map a client error onto the transport fault taxonomy
pub fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    let message = e.to_string();
    if e.is_builder() {
        return TransportError::Invalid(message);
    }

    let kind = if e.is_connect() {
        FaultKind::NotConnected
    } else if e.is_timeout() {
        FaultKind::ResponseNotReady
    } else if io_error_kind(&e) == Some(std::io::ErrorKind::ConnectionReset) {
        FaultKind::ConnectionReset
    } else if io_error_kind(&e) == Some(std::io::ErrorKind::UnexpectedEof)
        || e.is_body()
        || e.is_decode()
    {
        FaultKind::IncompleteRead
    } else if e.is_request() {
        FaultKind::CannotSendRequest
    } else {
        FaultKind::Io
    };

    TransportError::fault(kind, message)
}

fn io_error_kind(e: &reqwest::Error) -> Option<std::io::ErrorKind> {
    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            return Some(io.kind());
        }
        source = err.source();
    }
    None
}
