//! Per-session task: connect, subscribe, receive, close.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::aggregate::Aggregator;
use super::registry::{OpenRequest, SessionRegistry, SessionSettings};
use super::supervisor::LivenessSupervisor;
use super::transport::{Connection, Connector, Frame};
use super::{SessionId, SessionKey};
use crate::error::BridgeError;

/// Drives one session from `Connecting` to `Closed`.
///
/// The runner is the only writer of its session's aggregated value and the
/// only owner of its connection.
pub(crate) struct SessionRunner {
    registry: Arc<SessionRegistry>,
    connector: Arc<dyn Connector>,
    key: SessionKey,
    id: SessionId,
    url: String,
    initial_message: String,
    aggregator: Aggregator,
    settings: SessionSettings,
    cancel: CancellationToken,
}

impl SessionRunner {
    pub(crate) fn new(
        registry: Arc<SessionRegistry>,
        id: SessionId,
        request: &OpenRequest,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connector: registry.connector(),
            settings: *registry.settings(),
            registry,
            key: request.key.clone(),
            id,
            url: request.url.clone(),
            initial_message: request.initial_message.clone(),
            aggregator: Aggregator::new(request.merge.clone()),
            cancel,
        }
    }

    pub(crate) async fn run(self) {
        let supervisor = LivenessSupervisor::new(
            Arc::clone(&self.registry),
            self.key.clone(),
            self.id,
            self.cancel.clone(),
            self.settings.keepalive_timeout,
            self.settings.check_interval,
        );
        let supervisor = tokio::spawn(supervisor.run());

        if let Some(mut connection) = self.connect().await {
            self.serve(connection.as_mut()).await;

            if let Err(e) = self.registry.begin_closing(&self.key, self.id) {
                debug!("Session {} not marked closing: {}", self.key, e);
            }
            match tokio::time::timeout(self.settings.close_grace, connection.close()).await {
                Ok(Ok(())) => debug!("Session {} connection closed", self.key),
                Ok(Err(e)) => debug!("Session {} close handshake failed: {}", self.key, e),
                Err(_) => debug!("Session {} close handshake timed out", self.key),
            }
        }

        self.cancel.cancel();
        if let Err(e) = supervisor.await {
            warn!("Liveness supervisor for {} failed: {}", self.key, e);
        }

        match self.registry.finish(&self.key, self.id) {
            Ok(()) => info!("Session {} ({}) closed", self.key, self.id),
            Err(e) => debug!("Session {} already released: {}", self.key, e),
        }
    }

    async fn connect(&self) -> Option<Box<dyn Connection>> {
        let result = tokio::select! {
            _ = self.cancel.cancelled() => {
                info!("Session {} closed during handshake", self.key);
                return None;
            }
            result = self.connector.connect(&self.url) => result,
        };

        match result {
            Ok(connection) => Some(connection),
            Err(e) => {
                warn!("WebSocket connection error for {} ({}): {}", self.key, self.url, e);
                None
            }
        }
    }

    /// Run the open phase until the session should close.
    async fn serve(&self, connection: &mut dyn Connection) {
        if let Err(e) = self.registry.mark_open(&self.key, self.id) {
            warn!("Session {} could not be opened: {}", self.key, e);
            return;
        }
        if self.cancel.is_cancelled() {
            return;
        }

        if let Err(e) = connection.send(&self.initial_message).await {
            warn!("Failed to send initial message for {}: {}", self.key, e);
            return;
        }
        info!("Session {} open", self.key);

        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Session {} close requested", self.key);
                    return;
                }
                frame = connection.receive(self.settings.poll_interval) => frame,
            };

            match frame {
                Ok(Frame::Text(raw)) => {
                    match self
                        .registry
                        .record_message(&self.key, self.id, &self.aggregator, &raw)
                    {
                        Ok(()) => trace!("Session {} stored {} bytes", self.key, raw.len()),
                        Err(BridgeError::Decode(e)) => {
                            debug!("Session {} ignored message: {}", self.key, e)
                        }
                        Err(e) => {
                            debug!("Session {} stopped receiving: {}", self.key, e);
                            return;
                        }
                    }
                }
                Ok(Frame::Idle) => {}
                Ok(Frame::Closed) => {
                    info!("Upstream closed session {}", self.key);
                    return;
                }
                Err(e) => {
                    warn!("WebSocket error on {}: {}", self.key, e);
                    return;
                }
            }
        }
    }
}
