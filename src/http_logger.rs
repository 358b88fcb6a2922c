//! HTTP Request Logger
//!
//! Logs every upload-session HTTP exchange to a file when enabled via
//! environment variable. Set `VIDUP_HTTP_LOG=1` or `VIDUP_HTTP_LOG=true`
//! to enable. Video payloads are never written, only their byte ranges.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::Local;
use reqwest::header::HeaderMap;
use tracing::warn;

/// Environment variable to control HTTP logging
const ENV_HTTP_LOG: &str = "VIDUP_HTTP_LOG";

/// Directory the log is written to, relative to the working directory
const LOG_DIR: &str = ".vidup";

/// Log file name
const LOG_FILE_NAME: &str = "http_requests.log";

/// Maximum body size to log (10KB)
const MAX_BODY_SIZE: usize = 10000;

/// Sensitive headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "set-cookie",
    "cookie",
    "x-goog-api-key",
    "proxy-authorization",
];

/// Check if HTTP logging is enabled
pub fn is_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::env::var(ENV_HTTP_LOG)
            .map(|v| {
                let v = v.trim().to_lowercase();
                v == "1" || v == "true" || v == "yes" || v == "on"
            })
            .unwrap_or(false)
    })
}

fn get_log_file_path() -> PathBuf {
    let log_dir = PathBuf::from(LOG_DIR);
    if !log_dir.exists() {
        if let Err(e) = fs::create_dir_all(&log_dir) {
            warn!("Failed to create {} directory: {}", LOG_DIR, e);
        }
    }
    log_dir.join(LOG_FILE_NAME)
}

/// HTTP request log entry
pub struct HttpRequestLog {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// HTTP response log entry
pub struct HttpResponseLog {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Render one exchange as a log block
pub fn format_entry(
    request: &HttpRequestLog,
    response: Option<&HttpResponseLog>,
    duration_ms: u64,
    error: Option<&str>,
) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    let separator = "=".repeat(80);

    let mut log_content = String::new();
    log_content.push_str(&format!(
        "\n{}\n[{}] {} {}\n{}\n",
        separator, timestamp, request.method, request.url, separator
    ));

    log_content.push_str("\n--- Request Headers ---\n");
    for (name, value) in &request.headers {
        let display_value = mask_sensitive_header(name, value);
        log_content.push_str(&format!("{}: {}\n", name, display_value));
    }

    if let Some(body) = &request.body {
        log_content.push_str("\n--- Request Body ---\n");
        log_content.push_str(&format_body(body));
        log_content.push('\n');
    }

    if let Some(resp) = response {
        log_content.push_str(&format!("\n--- Response ({}ms) ---\n", duration_ms));
        log_content.push_str(&format!("Status: {}\n", resp.status));

        log_content.push_str("\n--- Response Headers ---\n");
        for (name, value) in &resp.headers {
            let display_value = mask_sensitive_header(name, value);
            log_content.push_str(&format!("{}: {}\n", name, display_value));
        }

        if let Some(body) = resp.body.as_deref().filter(|b| !b.is_empty()) {
            log_content.push_str("\n--- Response Body ---\n");
            log_content.push_str(&format_body(body));
            log_content.push('\n');
        }
    }

    if let Some(err) = error {
        log_content.push_str(&format!("\n--- Error ({}ms) ---\n", duration_ms));
        log_content.push_str(err);
        log_content.push('\n');
    }

    log_content.push_str(&format!("\n{}\n", separator));
    log_content
}

/// Log an HTTP request and response
pub fn log_request(
    request: &HttpRequestLog,
    response: Option<&HttpResponseLog>,
    duration_ms: u64,
    error: Option<&str>,
) {
    if !is_enabled() {
        return;
    }

    let log_content = format_entry(request, response, duration_ms, error);
    if let Err(e) = write_log(&get_log_file_path(), &log_content) {
        warn!("Failed to write HTTP log: {}", e);
    }
}

fn write_log(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// Check if a header is sensitive and should be masked
pub fn is_sensitive_header(name: &str) -> bool {
    let name_lower = name.to_lowercase();
    SENSITIVE_HEADERS.iter().any(|h| name_lower == *h)
}

fn mask_sensitive_header(name: &str, value: &str) -> String {
    if is_sensitive_header(name) {
        mask_token(value)
    } else {
        value.to_string()
    }
}

/// Mask authorization token for security
pub fn mask_token(value: &str) -> String {
    let (scheme, token) = match value.strip_prefix("Bearer ") {
        Some(token) => ("Bearer ", token),
        None => ("", value),
    };

    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 8 {
        let prefix: String = chars[..4].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{}...{}", scheme, prefix, suffix)
    } else {
        format!("{}****", scheme)
    }
}

fn format_body(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let pretty = serde_json::to_string_pretty(&json).unwrap_or_else(|_| body.to_string());
        truncate_utf8_safe(&pretty, MAX_BODY_SIZE)
    } else {
        truncate_utf8_safe(body, MAX_BODY_SIZE)
    }
}

/// Truncate string at UTF-8 character boundary (safe for multi-byte chars)
pub fn truncate_utf8_safe(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...\n[truncated, total {} bytes]", &s[..end], s.len())
}

/// Build a request log entry, or None if logging is disabled
pub fn build_request_log_if_enabled(
    method: &str,
    url: &str,
    headers: &[(&str, String)],
    body: Option<&str>,
) -> Option<HttpRequestLog> {
    if !is_enabled() {
        return None;
    }

    Some(HttpRequestLog {
        method: method.to_string(),
        url: url.to_string(),
        headers: headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect(),
        body: body.map(|s| s.to_string()),
    })
}

/// Response headers as owned name/value pairs
pub fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                value.to_str().unwrap_or("<binary>").to_string(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_entry_masks_authorization() {
        let request = HttpRequestLog {
            method: "PUT".to_string(),
            url: "https://upload.example.com/session".to_string(),
            headers: vec![
                ("Authorization".to_string(), "Bearer ya29.abcdefghijkl".to_string()),
                ("Content-Range".to_string(), "bytes 0-9/10".to_string()),
            ],
            body: Some("<10 bytes of clip.mp4>".to_string()),
        };
        let response = HttpResponseLog {
            status: 308,
            headers: vec![("range".to_string(), "bytes=0-9".to_string())],
            body: Some(String::new()),
        };

        let entry = format_entry(&request, Some(&response), 12, None);
        assert!(entry.contains("PUT https://upload.example.com/session"));
        assert!(entry.contains("Authorization: Bearer ya29...ijkl"));
        assert!(!entry.contains("abcdefghijkl"));
        assert!(entry.contains("Status: 308"));
        assert!(entry.contains("Content-Range: bytes 0-9/10"));
        assert!(!entry.contains("--- Response Body ---"));
    }

    #[test]
    fn test_format_entry_with_error() {
        let request = HttpRequestLog {
            method: "POST".to_string(),
            url: "https://upload.example.com/videos".to_string(),
            headers: vec![],
            body: None,
        };
        let entry = format_entry(&request, None, 5, Some("connection refused"));
        assert!(entry.contains("--- Error (5ms) ---"));
        assert!(entry.contains("connection refused"));
    }

    #[test]
    fn test_header_pairs() {
        let mut headers = HeaderMap::new();
        headers.insert("location", "https://x/session".parse().unwrap());
        let pairs = header_pairs(&headers);
        assert_eq!(
            pairs,
            vec![("location".to_string(), "https://x/session".to_string())]
        );
    }
}
