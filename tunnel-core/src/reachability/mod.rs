//! Network path reachability tracking
//!
//! A reachability monitor observes a network path source and reports status
//! transitions to a single registered callback. It owns no session state;
//! the coordinator decides what each transition means.

pub mod network_manager;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Reachability of the network path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReachabilityStatus {
    #[default]
    Unknown,
    Reachable,
    NotReachable,
}

impl std::fmt::Display for ReachabilityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReachabilityStatus::Unknown => write!(f, "unknown"),
            ReachabilityStatus::Reachable => write!(f, "reachable"),
            ReachabilityStatus::NotReachable => write!(f, "not reachable"),
        }
    }
}

/// Callback invoked on every reachability transition
pub type ReachabilityCallback = Arc<dyn Fn(ReachabilityStatus) + Send + Sync + 'static>;

/// Observes network reachability on behalf of the coordinator
pub trait ReachabilityMonitor: Send + Sync {
    /// Begin observation, replacing any previously registered callback
    fn start_tracking(&self, on_change: ReachabilityCallback);

    /// Halt observation; safe to call when not tracking
    fn stop_tracking(&self);

    fn is_tracking(&self) -> bool;
}

/// Reachability monitor fed by a `watch` channel of path statuses
///
/// The callback runs on a tokio task and only sees changes: repeated
/// publications of the same status are collapsed.
pub struct PathReachability {
    source: watch::Receiver<ReachabilityStatus>,
    tracking: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PathReachability {
    /// Create a monitor over an existing path source
    pub fn new(source: watch::Receiver<ReachabilityStatus>) -> Self {
        Self {
            source,
            tracking: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Create a monitor together with the sender that drives it
    pub fn channel() -> (watch::Sender<ReachabilityStatus>, Self) {
        let (tx, rx) = watch::channel(ReachabilityStatus::Unknown);
        (tx, Self::new(rx))
    }

    fn abort_task(&self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

impl ReachabilityMonitor for PathReachability {
    fn start_tracking(&self, on_change: ReachabilityCallback) {
        if self.tracking.swap(true, Ordering::SeqCst) {
            tracing::debug!("Reachability already tracked, replacing callback");
        }
        self.abort_task();

        let mut source = self.source.clone();
        let mut last = *source.borrow_and_update();
        tracing::info!(status = %last, "Started reachability tracking");

        let handle = tokio::spawn(async move {
            while source.changed().await.is_ok() {
                let status = *source.borrow_and_update();
                if status == last {
                    continue;
                }
                tracing::debug!(from = %last, to = %status, "Reachability changed");
                last = status;
                on_change(status);
            }
            tracing::debug!("Reachability source closed");
        });

        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
    }

    fn stop_tracking(&self) {
        if !self.tracking.swap(false, Ordering::SeqCst) {
            return;
        }
        self.abort_task();
        tracing::info!("Stopped reachability tracking");
    }

    fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::SeqCst)
    }
}

impl Drop for PathReachability {
    fn drop(&mut self) {
        self.abort_task();
    }
}
