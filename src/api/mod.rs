//! API layer for extension-bridge.
//!
//! This module provides the REST endpoints the browser extension polls to
//! drive upstream WebSocket sessions and forward HTTP requests.
//!
//! ## Endpoints
//!
//! ### Health & Info
//! - `GET /health` - Health check
//! - `GET /api/get` - Plugin liveness probe
//!
//! ### WebSocket sessions
//! - `POST /api/ws/connect` - Open a keyed session
//! - `GET /api/ws/message/{key}` - Read the aggregated value
//! - `POST /api/ws/keepalive/{key}` - Refresh a session's liveness
//! - `GET /api/ws/all` - List live session keys
//! - `DELETE /api/ws/close/{key}` - Close a session
//!
//! ### Forwarding
//! - `POST /api/proxy` - Replay an HTTP request through the outbound proxy
//!
//! ## Example
//!
//! ```no_run
//! use extension_bridge::api::{ServerConfig, serve};
//!
//! #[tokio::main]
//! async fn main() -> extension_bridge::Result<()> {
//!     let config = ServerConfig::new("127.0.0.1", 50888);
//!     serve(config).await
//! }
//! ```

pub mod handlers;
pub mod router;
pub mod types;

// Re-export commonly used types
pub use handlers::AppState;
pub use router::{create_router, create_router_with_state, serve, serve_with_state, ServerConfig};
pub use types::{ConnectRequest, ErrorResponse, MessageResponse, ProxyRequest};
