//! Keyed registry of upstream WebSocket sessions.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::aggregate::{Aggregated, Aggregator, MergeOptions};
use super::runner::SessionRunner;
use super::transport::{Connector, TungsteniteConnector};
use super::{SessionId, SessionKey, SessionState};
use crate::error::BridgeError;
use crate::Result;

/// Maximum gap between keepalives before a session is closed.
pub const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);
/// How often the liveness supervisor wakes up.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(1);
/// Upper bound on a single receive wait.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Upper bound on the close handshake.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Timing parameters shared by every session of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Liveness window.
    pub keepalive_timeout: Duration,
    /// Supervisor wake-up interval.
    pub check_interval: Duration,
    /// Receive poll interval.
    pub poll_interval: Duration,
    /// Close handshake grace period.
    pub close_grace: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            keepalive_timeout: DEFAULT_KEEPALIVE_TIMEOUT,
            check_interval: DEFAULT_CHECK_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            close_grace: DEFAULT_CLOSE_GRACE,
        }
    }
}

/// Parameters for opening a session.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    /// Caller key.
    pub key: SessionKey,
    /// Upstream `ws://` or `wss://` URL.
    pub url: String,
    /// Text sent once right after the handshake.
    pub initial_message: String,
    /// Aggregation settings.
    pub merge: MergeOptions,
}

impl OpenRequest {
    pub fn new(key: SessionKey, url: impl Into<String>, initial_message: impl Into<String>) -> Self {
        Self {
            key,
            url: url.into(),
            initial_message: initial_message.into(),
            merge: MergeOptions::disabled(),
        }
    }

    pub fn with_merge(mut self, merge: MergeOptions) -> Self {
        self.merge = merge;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(BridgeError::InvalidRequest("url is required".into()));
        }
        if self.initial_message.is_empty() {
            return Err(BridgeError::InvalidRequest("message is required".into()));
        }
        self.merge.validate()
    }
}

/// Registry-side state of one session.
struct Entry {
    id: SessionId,
    state: SessionState,
    value: Option<Aggregated>,
    last_liveness: Instant,
    /// Set once a close was requested, whatever the state was then.
    closing: bool,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Entry {
    fn request_close(&mut self) {
        if self.state == SessionState::Open {
            let _ = self.state.transition_to(SessionState::Closing);
        }
        self.closing = true;
        self.cancel.cancel();
    }

    /// Visible to callers: connecting or open, and not asked to close.
    fn is_visible(&self) -> bool {
        self.state.is_live() && !self.closing
    }
}

/// Thread-safe registry of sessions, at most one per key.
///
/// Every session is a tokio task spawned by [`SessionRegistry::open`]; the
/// task removes its own entry when it finishes, after which every lookup by
/// that key reports [`BridgeError::SessionNotFound`].
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionKey, Entry>>,
    connector: Arc<dyn Connector>,
    settings: SessionSettings,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new(connector: Arc<dyn Connector>, settings: SessionSettings) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            connector,
            settings,
        }
    }

    /// Create a registry using real WebSocket connections.
    pub fn with_settings(settings: SessionSettings) -> Self {
        Self::new(Arc::new(TungsteniteConnector::new()), settings)
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub(crate) fn connector(&self) -> Arc<dyn Connector> {
        Arc::clone(&self.connector)
    }

    /// Open a session and return immediately.
    ///
    /// The handshake happens on the session's own task; callers poll
    /// [`read`](Self::read) to see it come up. Fails with
    /// [`BridgeError::SessionExists`] if the key is taken.
    pub fn open(self: &Arc<Self>, request: OpenRequest) -> Result<SessionId> {
        request.validate()?;

        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| BridgeError::LockPoisoned)?;

        if sessions.contains_key(request.key.as_str()) {
            return Err(BridgeError::SessionExists(request.key.to_string()));
        }

        let id = SessionId::new();
        let cancel = CancellationToken::new();
        let runner = SessionRunner::new(Arc::clone(self), id, &request, cancel.clone());
        let task = tokio::spawn(runner.run());

        info!(
            "Session {} ({}) opening to {}",
            request.key, id, request.url
        );

        sessions.insert(
            request.key,
            Entry {
                id,
                state: SessionState::Connecting,
                value: None,
                last_liveness: Instant::now(),
                closing: false,
                cancel,
                task: Some(task),
            },
        );

        Ok(id)
    }

    /// Get the current aggregated value.
    ///
    /// `Ok(None)` means the session is live but nothing has arrived yet.
    pub fn read(&self, key: &str) -> Result<Option<Aggregated>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| BridgeError::LockPoisoned)?;

        match sessions.get(key) {
            Some(entry) if entry.is_visible() => Ok(entry.value.clone()),
            _ => Err(BridgeError::SessionNotFound(key.to_string())),
        }
    }

    /// Refresh the liveness timestamp of a session.
    pub fn keepalive(&self, key: &str) -> Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| BridgeError::LockPoisoned)?;

        match sessions.get_mut(key) {
            Some(entry) if entry.is_visible() => {
                entry.last_liveness = Instant::now();
                Ok(())
            }
            _ => Err(BridgeError::SessionNotFound(key.to_string())),
        }
    }

    /// List the keys of all connecting or open sessions, sorted.
    pub fn list_keys(&self) -> Result<Vec<SessionKey>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| BridgeError::LockPoisoned)?;

        let mut keys: Vec<SessionKey> = sessions
            .iter()
            .filter(|(_, entry)| entry.is_visible())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Ask a session to close.
    ///
    /// The session disappears from reads immediately and from the registry
    /// once its task has released the connection.
    pub fn close(&self, key: &str) -> Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| BridgeError::LockPoisoned)?;

        match sessions.get_mut(key) {
            Some(entry) if entry.is_visible() => {
                info!("Close requested for session {}", key);
                entry.request_close();
                Ok(())
            }
            _ => Err(BridgeError::SessionNotFound(key.to_string())),
        }
    }

    /// Get the lifecycle state of a session, if it is still registered.
    pub fn state(&self, key: &str) -> Result<Option<SessionState>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| BridgeError::LockPoisoned)?;
        Ok(sessions.get(key).map(|entry| entry.state))
    }

    /// Get the number of registered sessions, including closing ones.
    pub fn count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Close every session and wait for all session tasks to finish.
    pub async fn shutdown(&self) {
        let tasks: Vec<(SessionKey, JoinHandle<()>)> = match self.sessions.write() {
            Ok(mut sessions) => sessions
                .iter_mut()
                .filter_map(|(key, entry)| {
                    entry.request_close();
                    entry.task.take().map(|task| (key.clone(), task))
                })
                .collect(),
            Err(_) => {
                warn!("Session registry lock poisoned, skipping shutdown");
                return;
            }
        };

        if !tasks.is_empty() {
            info!("Closing {} session(s)", tasks.len());
        }

        for (key, task) in tasks {
            if let Err(e) = task.await {
                warn!("Session task for {} failed: {}", key, e);
            }
        }
    }

    // Lifecycle hooks used by the session task and its supervisor. They only
    // touch the entry carrying the caller's own session id.

    fn update<F, T>(&self, key: &SessionKey, id: SessionId, f: F) -> Result<T>
    where
        F: FnOnce(&mut Entry) -> T,
    {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| BridgeError::LockPoisoned)?;

        let entry = sessions
            .get_mut(key.as_str())
            .filter(|entry| entry.id == id)
            .ok_or_else(|| BridgeError::SessionNotFound(key.to_string()))?;

        Ok(f(entry))
    }

    pub(crate) fn mark_open(&self, key: &SessionKey, id: SessionId) -> Result<()> {
        self.update(key, id, |entry| {
            entry.state.transition_to(SessionState::Open)?;
            entry.last_liveness = Instant::now();
            Ok(())
        })?
    }

    pub(crate) fn begin_closing(&self, key: &SessionKey, id: SessionId) -> Result<()> {
        self.update(key, id, |entry| {
            if entry.state == SessionState::Open {
                entry.state.transition_to(SessionState::Closing)
            } else {
                Ok(())
            }
        })?
    }

    pub(crate) fn request_close(&self, key: &SessionKey, id: SessionId) -> Result<()> {
        self.update(key, id, Entry::request_close)
    }

    /// Liveness timestamp of a live session.
    pub(crate) fn last_liveness(&self, key: &SessionKey, id: SessionId) -> Option<Instant> {
        self.update(key, id, |entry| {
            entry.is_visible().then_some(entry.last_liveness)
        })
        .ok()
        .flatten()
    }

    /// Run one inbound message through the aggregator.
    pub(crate) fn record_message(
        &self,
        key: &SessionKey,
        id: SessionId,
        aggregator: &Aggregator,
        raw: &str,
    ) -> Result<()> {
        let extracted = aggregator.extract(raw)?;
        self.update(key, id, |entry| aggregator.commit(&mut entry.value, extracted))?
    }

    /// Mark a session closed and drop its entry.
    pub(crate) fn finish(&self, key: &SessionKey, id: SessionId) -> Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| BridgeError::LockPoisoned)?;

        if !sessions.get(key.as_str()).is_some_and(|entry| entry.id == id) {
            return Err(BridgeError::SessionNotFound(key.to_string()));
        }

        if let Some(mut entry) = sessions.remove(key.as_str()) {
            if let Err(e) = entry.state.transition_to(SessionState::Closed) {
                debug!("Session {} closed from unexpected state: {}", key, e);
            }
        }
        Ok(())
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_settings(SessionSettings::default())
    }
}
