//! Stored OAuth credentials, one JSON file per account login

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

/// Expiry timestamps are stored in this format
pub const EXPIRY_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Token endpoint used when the stored credential does not name one
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the recorded expiry
const EXPIRY_SKEW_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Invalid account login: {0:?}")]
    InvalidLogin(String),

    #[error("No credential with login {account} (file: {})", .path.display())]
    NotFound { account: String, path: PathBuf },

    #[error("Invalid credential with login {account} (file: {})", .path.display())]
    Invalid { account: String, path: PathBuf },

    #[error("Malformed credential file {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to access credential file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Credential with login {account} has expired and has no refresh token")]
    Expired { account: String },

    #[error("Token refresh failed for login {account}: {message}")]
    Refresh { account: String, message: String },
}

/// One stored credential; unknown fields survive a load/save cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub invalid: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl Credential {
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        let raw = self.token_expiry.as_deref()?;
        NaiveDateTime::parse_from_str(raw, EXPIRY_FORMAT)
            .map(|naive| naive.and_utc())
            .ok()
    }

    /// True once `now` is within the skew window of the expiry
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry() {
            Some(expiry) => now + Duration::seconds(EXPIRY_SKEW_SECS) >= expiry,
            None => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Directory of `<login>.json` credential files
#[derive(Debug, Clone)]
pub struct AccountStore {
    dir: PathBuf,
}

impl AccountStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, account: &str) -> Result<PathBuf, CredentialError> {
        let account = account.trim();
        if account.is_empty()
            || account.contains(['/', '\\'])
            || account == "."
            || account.contains("..")
        {
            return Err(CredentialError::InvalidLogin(account.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", account)))
    }

    pub fn load(&self, account: &str) -> Result<Credential, CredentialError> {
        let path = self.path_for(account)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CredentialError::NotFound {
                    account: account.to_string(),
                    path,
                });
            }
            Err(source) => return Err(CredentialError::Io { path, source }),
        };

        let credential: Credential = serde_json::from_str(&content)
            .map_err(|source| CredentialError::Malformed {
                path: path.clone(),
                source,
            })?;

        if credential.invalid {
            return Err(CredentialError::Invalid {
                account: account.to_string(),
                path,
            });
        }
        Ok(credential)
    }

    pub fn save(&self, account: &str, credential: &Credential) -> Result<(), CredentialError> {
        let path = self.path_for(account)?;
        let content = serde_json::to_string(credential).map_err(|source| {
            CredentialError::Malformed {
                path: path.clone(),
                source,
            }
        })?;
        fs::write(&path, content).map_err(|source| CredentialError::Io { path, source })
    }

    /// Load the credential for `account`, refreshing it first if it has expired
    pub fn authorize(&self, client: &Client, account: &str) -> Result<String, CredentialError> {
        let mut credential = self.load(account)?;
        self.ensure_fresh(client, account, &mut credential)
    }

    /// Current access token of `credential`, refreshed when missing or expired
    pub fn ensure_fresh(
        &self,
        client: &Client,
        account: &str,
        credential: &mut Credential,
    ) -> Result<String, CredentialError> {
        if let Some(token) = &credential.access_token {
            if !credential.is_expired(Utc::now()) {
                return Ok(token.clone());
            }
        }
        self.refresh(client, account, credential)
    }

    /// Exchange the refresh token for a new access token and store it
    pub fn refresh(
        &self,
        client: &Client,
        account: &str,
        credential: &mut Credential,
    ) -> Result<String, CredentialError> {
        let Some(refresh_token) = credential.refresh_token.clone() else {
            return Err(CredentialError::Expired {
                account: account.to_string(),
            });
        };
        info!("Refreshing access token for {}", account);

        let refresh_failed = |message: String| CredentialError::Refresh {
            account: account.to_string(),
            message,
        };

        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", &refresh_token),
        ];
        if let Some(client_id) = credential.client_id.as_deref() {
            form.push(("client_id", client_id));
        }
        if let Some(client_secret) = credential.client_secret.as_deref() {
            form.push(("client_secret", client_secret));
        }

        let response = client
            .post(&credential.token_uri)
            .form(&form)
            .send()
            .map_err(|e| refresh_failed(e.to_string()))?;

        let status = response.status();
        let body = response.text().map_err(|e| refresh_failed(e.to_string()))?;

        if !status.is_success() {
            let parsed = serde_json::from_str::<TokenErrorResponse>(&body).ok();
            if parsed.as_ref().map(|e| e.error.as_str()) == Some("invalid_grant") {
                warn!("Refresh token for {} was revoked", account);
                credential.invalid = true;
                self.save(account, credential)?;
                return Err(CredentialError::Invalid {
                    account: account.to_string(),
                    path: self.path_for(account)?,
                });
            }
            let message = match parsed {
                Some(TokenErrorResponse {
                    error,
                    error_description: Some(description),
                }) => format!("{}: {}", error, description),
                Some(TokenErrorResponse { error, .. }) => error,
                None => format!("HTTP {}: {}", status.as_u16(), body),
            };
            return Err(refresh_failed(message));
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| refresh_failed(e.to_string()))?;

        credential.access_token = Some(token.access_token.clone());
        if let Some(refresh_token) = token.refresh_token {
            credential.refresh_token = Some(refresh_token);
        }
        // A lifetime past chrono's range leaves no expiry recorded
        credential.token_expiry = token
            .expires_in
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .map(|expiry| expiry.format(EXPIRY_FORMAT).to_string());
        self.save(account, credential)?;
        Ok(token.access_token)
    }
}
