//! Keepalive watchdog for a single session.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::registry::SessionRegistry;
use super::{SessionId, SessionKey};

/// Check whether a keepalive deadline has passed.
pub fn is_expired(last_liveness: Instant, now: Instant, timeout: Duration) -> bool {
    now.saturating_duration_since(last_liveness) > timeout
}

/// Closes its session when keepalives stop arriving.
///
/// One supervisor runs per session and stops as soon as the session's
/// cancellation token fires or its registry entry is gone.
pub(crate) struct LivenessSupervisor {
    registry: Arc<SessionRegistry>,
    key: SessionKey,
    id: SessionId,
    cancel: CancellationToken,
    timeout: Duration,
    check_interval: Duration,
}

impl LivenessSupervisor {
    pub(crate) fn new(
        registry: Arc<SessionRegistry>,
        key: SessionKey,
        id: SessionId,
        cancel: CancellationToken,
        timeout: Duration,
        check_interval: Duration,
    ) -> Self {
        Self {
            registry,
            key,
            id,
            cancel,
            timeout,
            check_interval,
        }
    }

    pub(crate) async fn run(self) {
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(last) = self.registry.last_liveness(&self.key, self.id) else {
                break;
            };

            if is_expired(last, Instant::now(), self.timeout) {
                info!(
                    "Session {} timed out after {:?} without keepalive",
                    self.key, self.timeout
                );
                if let Err(e) = self.registry.request_close(&self.key, self.id) {
                    debug!("Session {} already gone: {}", self.key, e);
                }
                break;
            }
        }

        debug!("Liveness supervisor for {} stopped", self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::registry::SessionSettings;
    use crate::session::transport::fake::FakeConnector;

    fn supervisor(registry: Arc<SessionRegistry>, cancel: CancellationToken) -> LivenessSupervisor {
        LivenessSupervisor::new(
            registry,
            SessionKey::new("watch").unwrap(),
            SessionId::from_raw(7),
            cancel,
            Duration::from_secs(10),
            Duration::from_secs(1),
        )
    }

    fn empty_registry() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(
            Arc::new(FakeConnector::new()),
            SessionSettings::default(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_expired_boundary() {
        let start = Instant::now();
        let timeout = Duration::from_secs(10);

        assert!(!is_expired(start, start, timeout));
        assert!(!is_expired(start, start + Duration::from_secs(10), timeout));
        assert!(is_expired(start, start + Duration::from_millis(10_001), timeout));
        // A keepalive newer than `now` never counts as expired.
        assert!(!is_expired(start + Duration::from_secs(5), start, timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_entry_missing() {
        let handle = tokio::spawn(supervisor(empty_registry(), CancellationToken::new()).run());
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("supervisor should stop")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let handle = tokio::spawn(supervisor(empty_registry(), cancel).run());
        tokio::time::timeout(Duration::from_millis(10), handle)
            .await
            .expect("supervisor should stop")
            .unwrap();
    }
}
