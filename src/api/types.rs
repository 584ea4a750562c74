//! API request and response types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BridgeError;
use crate::forward::{decode_hex_body, ForwardMethod, ResponseFormat, UpstreamRequest};
use crate::session::{MergeOptions, OpenRequest, SessionKey};

/// Request to open a WebSocket session.
///
/// Every field is optional at the wire level so that a missing field is
/// reported as a 400 with a readable message.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConnectRequest {
    /// Upstream WebSocket URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Initial message; strings are sent verbatim, other JSON is serialized.
    #[serde(default)]
    pub message: Option<Value>,
    /// Caller-chosen session key.
    #[serde(default)]
    pub key: Option<String>,
    /// Merge the `merge_key` field across messages; `null` means off.
    #[serde(default)]
    pub merge: Option<bool>,
    /// Field to extract when merging.
    #[serde(default)]
    pub merge_key: Option<String>,
    /// Field used to deduplicate merged sequences.
    #[serde(default)]
    pub dedupe_key: Option<String>,
}

impl ConnectRequest {
    /// Validate and convert into a registry open request.
    pub fn into_open_request(self) -> Result<OpenRequest, BridgeError> {
        let url = non_empty(self.url);
        let message = self.message.and_then(|message| match message {
            Value::String(text) => non_empty(Some(text)),
            Value::Null => None,
            other => Some(other.to_string()),
        });
        let key = non_empty(self.key);

        let (Some(url), Some(message), Some(key)) = (url, message, key) else {
            return Err(BridgeError::InvalidRequest(
                "Missing required parameters".into(),
            ));
        };

        let merge = MergeOptions {
            enabled: self.merge.unwrap_or(false),
            target: non_empty(self.merge_key),
            dedupe_by: non_empty(self.dedupe_key),
        };

        Ok(OpenRequest::new(SessionKey::new(key)?, url, message).with_merge(merge))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Request to forward an HTTP call upstream.
///
/// Field names are kept short to match the extension's payloads.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProxyRequest {
    /// Target URL.
    #[serde(default)]
    pub u: Option<String>,
    /// Method (`GET` or `POST`, default `GET`).
    #[serde(default)]
    pub m: Option<String>,
    /// Hex-encoded UTF-8 request body.
    #[serde(default)]
    pub d: Option<String>,
    /// Request headers.
    #[serde(default)]
    pub h: Option<HashMap<String, String>>,
    /// Response type (`JSON` or `TEXT`, default `TEXT`).
    #[serde(default)]
    pub t: Option<String>,
}

impl ProxyRequest {
    /// Validate and convert into an upstream request.
    pub fn into_upstream(self) -> Result<UpstreamRequest, BridgeError> {
        let url = non_empty(self.u)
            .ok_or_else(|| BridgeError::InvalidRequest("Missing target url".into()))?;
        let method = ForwardMethod::parse(self.m.as_deref().unwrap_or("GET"))?;
        let body = match (method, non_empty(self.d)) {
            (ForwardMethod::Post, Some(hex)) => Some(decode_hex_body(&hex)?),
            _ => None,
        };

        Ok(UpstreamRequest {
            url,
            method,
            body,
            headers: self.h.unwrap_or_default(),
            format: self
                .t
                .as_deref()
                .map(ResponseFormat::parse)
                .unwrap_or_default(),
        })
    }
}

/// Plain acknowledgement.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Generic API error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Error code (e.g., "SESSION_NOT_FOUND").
    pub code: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }

    pub fn session_not_found(key: &str) -> Self {
        Self::new(
            "SESSION_NOT_FOUND",
            format!("No active connection found for key '{}'", key),
        )
    }

    pub fn session_exists(key: &str) -> Self {
        Self::new(
            "SESSION_EXISTS",
            format!("Connection with key '{}' already exists", key),
        )
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn upstream_error(message: impl Into<String>) -> Self {
        Self::new("UPSTREAM_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

impl From<&BridgeError> for ErrorResponse {
    fn from(err: &BridgeError) -> Self {
        match err {
            BridgeError::InvalidRequest(message) => Self::bad_request(message.clone()),
            BridgeError::SessionExists(key) => Self::session_exists(key),
            BridgeError::SessionNotFound(key) => Self::session_not_found(key),
            BridgeError::Upstream(message) => Self::upstream_error(message.clone()),
            BridgeError::Decode(message) => Self::upstream_error(message.clone()),
            other => Self::internal_error(other.to_string()),
        }
    }
}
