//! JSON result envelope printed on stdout
//!
//! Every invocation that finishes cleanly prints exactly one line:
//! `{"error":false,"out":{...}}` or `{"error":true,"error_out":"..."}`.

use serde::Serialize;
use serde_json::{json, Value};

use crate::upload::Outcome;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_out: Option<String>,
}

impl Envelope {
    pub fn success(id: &str, status: &str) -> Self {
        Self {
            error: false,
            out: Some(json!({ "id": id, "status": status })),
            error_out: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: true,
            out: None,
            error_out: Some(message.into()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"error":true,"error_out":"failed to serialize result"}"#.to_string()
        })
    }

    /// Write the envelope as a single stdout line
    pub fn print(&self) {
        println!("{}", self.to_json());
    }
}

impl From<&Outcome> for Envelope {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Success { remote_id, status } => Self::success(remote_id, status),
            Outcome::Failure { reason } => Self::failure(reason.as_str()),
        }
    }
}
