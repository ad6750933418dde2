//! NetworkManager-backed path source
//!
//! Polls the NetworkManager `State` property over the system D-Bus and
//! publishes the mapped [`ReachabilityStatus`] on a `watch` channel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use zbus::Connection;

use super::ReachabilityStatus;

const NM_BUS_NAME: &str = "org.freedesktop.NetworkManager";
const NM_OBJECT_PATH: &str = "/org/freedesktop/NetworkManager";

/// NM_STATE_CONNECTED_GLOBAL
const NM_STATE_CONNECTED_GLOBAL: u32 = 70;

/// Map an `NMState` value to a reachability status
pub fn status_from_nm_state(state: u32) -> ReachabilityStatus {
    match state {
        NM_STATE_CONNECTED_GLOBAL => ReachabilityStatus::Reachable,
        // ASLEEP, DISCONNECTED, DISCONNECTING
        10 | 20 | 30 => ReachabilityStatus::NotReachable,
        _ => ReachabilityStatus::Unknown,
    }
}

/// Path source reading connectivity from NetworkManager
pub struct NetworkManagerPath {
    connection: Connection,
}

impl NetworkManagerPath {
    /// Connect to the system D-Bus and verify NetworkManager is available
    ///
    /// # Errors
    ///
    /// Returns `NetworkManagerError` if D-Bus connection fails or NetworkManager is unavailable
    #[tracing::instrument]
    pub async fn new() -> Result<Self, NetworkManagerError> {
        let connection = Connection::system().await?;

        let proxy = zbus::fdo::DBusProxy::new(&connection).await?;
        let bus_name = zbus::names::BusName::try_from(NM_BUS_NAME)
            .map_err(|e| NetworkManagerError::QueryFailed(e.to_string()))?;
        let name_has_owner = proxy
            .name_has_owner(bus_name)
            .await
            .map_err(|e| NetworkManagerError::QueryFailed(e.to_string()))?;

        if !name_has_owner {
            return Err(NetworkManagerError::NetworkManagerUnavailable);
        }

        Ok(Self { connection })
    }

    /// Query the current reachability
    #[tracing::instrument(skip(self))]
    pub async fn current_status(&self) -> Result<ReachabilityStatus, NetworkManagerError> {
        let proxy = zbus::Proxy::new(&self.connection, NM_BUS_NAME, NM_OBJECT_PATH, NM_BUS_NAME).await?;

        let state: u32 = proxy
            .get_property("State")
            .await
            .map_err(|e| NetworkManagerError::QueryFailed(e.to_string()))?;

        Ok(status_from_nm_state(state))
    }

    /// Poll NetworkManager every `interval` and publish each reading
    ///
    /// The channel starts at the state NetworkManager reports right now, so
    /// a tracker registered afterwards only sees real changes. The polling
    /// task ends when every receiver has been dropped.
    pub async fn watch(self, interval: Duration) -> watch::Receiver<ReachabilityStatus> {
        let initial = self.read_status().await;
        tracing::debug!(status = %initial, "Initial NetworkManager reading");

        let path = Arc::new(self);
        poll_status(initial, interval, move || {
            let path = Arc::clone(&path);
            async move { path.read_status().await }
        })
    }

    async fn read_status(&self) -> ReachabilityStatus {
        match self.current_status().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("Failed to query NetworkManager state: {}", e);
                ReachabilityStatus::Unknown
            }
        }
    }
}

/// Publish `read` every `interval` on a channel seeded with `initial`
fn poll_status<F, Fut>(
    initial: ReachabilityStatus,
    interval: Duration,
    mut read: F,
) -> watch::Receiver<ReachabilityStatus>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ReachabilityStatus> + Send + 'static,
{
    let (tx, rx) = watch::channel(initial);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        loop {
            ticker.tick().await;
            let status = read().await;
            tx.send_if_modified(|current| {
                let changed = *current != status;
                *current = status;
                changed
            });
            if tx.is_closed() {
                break;
            }
        }
    });

    rx
}

/// Errors that can occur while talking to NetworkManager
#[derive(Debug, thiserror::Error)]
pub enum NetworkManagerError {
    #[error("D-Bus connection failed: {0}")]
    DBusConnectionFailed(#[from] zbus::Error),

    #[error("NetworkManager not available")]
    NetworkManagerUnavailable,

    #[error("Failed to query network state: {0}")]
    QueryFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reachability::{PathReachability, ReachabilityMonitor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_connected_global_is_reachable() {
        assert_eq!(status_from_nm_state(70), ReachabilityStatus::Reachable);
    }

    #[test]
    fn test_offline_states_are_not_reachable() {
        for state in [10, 20, 30] {
            assert_eq!(status_from_nm_state(state), ReachabilityStatus::NotReachable);
        }
    }

    #[tokio::test]
    async fn test_poller_starts_at_initial_reading() {
        // Given: A path that was already reachable when polling began
        let source = poll_status(ReachabilityStatus::Reachable, Duration::from_millis(5), || async {
            ReachabilityStatus::Reachable
        });
        assert_eq!(*source.borrow(), ReachabilityStatus::Reachable);

        let monitor = PathReachability::new(source);
        let changes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&changes);
        monitor.start_tracking(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        // When: Several polls return the same reading
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Then: The tracker never reports a change
        assert_eq!(changes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_poller_publishes_later_changes() {
        let readings = Arc::new(Mutex::new(vec![ReachabilityStatus::NotReachable]));
        let mut source = poll_status(ReachabilityStatus::Reachable, Duration::from_millis(5), move || {
            let reading = readings.lock().unwrap().pop();
            async move { reading.unwrap_or(ReachabilityStatus::Reachable) }
        });

        tokio::time::timeout(Duration::from_secs(1), source.changed())
            .await
            .expect("poller should publish the change")
            .unwrap();
        assert_eq!(*source.borrow(), ReachabilityStatus::NotReachable);
    }

    #[test]
    fn test_partial_connectivity_is_unknown() {
        for state in [0, 40, 50, 60] {
            assert_eq!(status_from_nm_state(state), ReachabilityStatus::Unknown);
        }
    }
}
