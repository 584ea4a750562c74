//! REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use tracing::{info, warn};

use super::types::{ConnectRequest, ErrorResponse, MessageResponse, ProxyRequest};
use crate::config::Config;
use crate::error::BridgeError;
use crate::forward::{Forwarder, UpstreamBody};
use crate::session::{Aggregated, SessionKey, SessionRegistry};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub forwarder: Arc<Forwarder>,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_parts(Arc::new(SessionRegistry::default()), Forwarder::default())
    }

    pub fn with_parts(registry: Arc<SessionRegistry>, forwarder: Forwarder) -> Self {
        Self {
            registry,
            forwarder: Arc::new(forwarder),
        }
    }

    /// Build the state described by a loaded configuration.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let registry = SessionRegistry::with_settings(config.session_settings());
        let forwarder = Forwarder::new(&config.forward_config())?;
        Ok(Self::with_parts(Arc::new(registry), forwarder))
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn reject(err: BridgeError) -> ApiError {
    let status = match &err {
        BridgeError::InvalidRequest(_) | BridgeError::SessionExists(_) => StatusCode::BAD_REQUEST,
        BridgeError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse::from(&err)))
}

/// Malformed or wrongly typed bodies are caller errors.
fn reject_body(rejection: JsonRejection) -> ApiError {
    reject(BridgeError::InvalidRequest(rejection.body_text()))
}

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}

/// Plugin liveness probe used by the extension.
pub async fn plugin_status() -> Json<MessageResponse> {
    Json(MessageResponse::new("Plugin started successfully"))
}

/// Forward an HTTP request through the outbound proxy.
pub async fn forward_request(
    State(state): State<AppState>,
    body: Result<Json<ProxyRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(reject_body)?;
    let upstream = req.into_upstream().map_err(reject)?;
    info!("Forwarding request to {}", upstream.url);

    let response = state.forwarder.forward(&upstream).await.map_err(reject)?;
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);

    Ok(match response.body {
        UpstreamBody::Json(value) => (status, Json(value)).into_response(),
        UpstreamBody::Text(text) => (status, text).into_response(),
    })
}

/// Open a keyed WebSocket session.
pub async fn connect_session(
    State(state): State<AppState>,
    body: Result<Json<ConnectRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(req) = body.map_err(reject_body)?;
    let request = req.into_open_request().map_err(reject)?;
    state.registry.open(request).map_err(|e| {
        if let BridgeError::SessionExists(key) = &e {
            warn!("Rejected duplicate session key {}", key);
        }
        reject(e)
    })?;

    Ok(Json(MessageResponse::new("WebSocket connection initiated")))
}

/// Read the current aggregated value of a session.
pub async fn read_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let value = state.registry.read(&key).map_err(reject)?;

    Ok(match value {
        Some(Aggregated::Json(value)) => Json(value).into_response(),
        Some(Aggregated::Text(text)) => text.into_response(),
        None => Json(Value::Null).into_response(),
    })
}

/// Refresh a session's keepalive timestamp.
pub async fn keepalive_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.registry.keepalive(&key).map_err(reject)?;
    Ok(Json(MessageResponse::new("Keepalive successful")))
}

/// List the keys of all live sessions.
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<Vec<SessionKey>>, ApiError> {
    let keys = state.registry.list_keys().map_err(reject)?;
    Ok(Json(keys))
}

/// Close a session.
pub async fn close_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.registry.close(&key).map_err(reject)?;
    Ok(Json(MessageResponse::new("WebSocket connection closing")))
}
