//! Keyed WebSocket session management.
//!
//! This module opens, aggregates, supervises, and tears down long-lived
//! upstream WebSocket subscriptions addressed by caller-chosen keys, and
//! exposes a poll-based read interface over them.

mod aggregate;
mod id;
mod registry;
mod runner;
mod state;
mod supervisor;
mod transport;

pub use aggregate::{find_value, Aggregated, Aggregator, Extracted, MergeOptions};
pub use id::{SessionId, SessionKey};
pub use registry::{
    OpenRequest, SessionRegistry, SessionSettings, DEFAULT_CHECK_INTERVAL, DEFAULT_CLOSE_GRACE,
    DEFAULT_KEEPALIVE_TIMEOUT, DEFAULT_POLL_INTERVAL,
};
pub use state::SessionState;
pub use supervisor::is_expired;
pub use transport::{Connection, Connector, Frame, TungsteniteConnector};
