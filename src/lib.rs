//! # extension-bridge
//!
//! Local helper daemon for a browser extension.
//!
//! The extension cannot hold long-lived WebSocket subscriptions or reach
//! some hosts directly, so it asks this process to do it: sessions are
//! opened under caller-chosen keys, incoming frames are folded into one
//! aggregated value per session, and the extension polls that value while
//! sending periodic keepalives. Sessions without a keepalive inside the
//! liveness window are closed and forgotten.
//!
//! ## Features
//!
//! - **Keyed sessions**: at most one live upstream connection per key
//! - **Aggregation**: raw, field-extracted, or merged (and deduplicated) values
//! - **Liveness**: keepalive-driven supervision with automatic cleanup
//! - **Forwarding**: GET/POST replay through a local outbound proxy
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use extension_bridge::{MergeOptions, OpenRequest, SessionKey, SessionRegistry};
//!
//! #[tokio::main]
//! async fn main() -> extension_bridge::Result<()> {
//!     extension_bridge::logging::try_init().ok();
//!
//!     let registry = Arc::new(SessionRegistry::default());
//!     let request = OpenRequest::new(
//!         SessionKey::new("trades")?,
//!         "wss://stream.example.com/ws",
//!         r#"{"op":"subscribe","args":["trades"]}"#,
//!     )
//!     .with_merge(MergeOptions::field("data").dedupe_by("id"));
//!
//!     let id = registry.open(request)?;
//!     println!("Session {} opened", id);
//!
//!     registry.keepalive("trades")?;
//!     let value = registry.read("trades")?;
//!     println!("Current value: {:?}", value);
//!
//!     registry.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod forward;
pub mod logging;
pub mod session;

// Re-export commonly used types
pub use error::{BridgeError, Result};
pub use forward::{ForwardConfig, Forwarder};
pub use session::{
    Aggregated, Aggregator, MergeOptions, OpenRequest, SessionId, SessionKey, SessionRegistry,
    SessionSettings, SessionState,
};
