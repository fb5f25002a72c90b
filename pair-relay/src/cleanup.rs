//! Background cleanup task for expired sessions.
//!
//! Runs periodically to delete sessions past their expiry and to prune idle
//! rate limiter keys.

use crate::config::CleanupConfig;
use crate::limits::RateLimits;
use crate::server::RelayMetrics;
use crate::store::SessionStore;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Handle to the running cleanup task.
#[derive(Debug)]
pub struct CleanupHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CleanupHandle {
    /// Stop the task and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("Cleanup task failed: {}", e);
        }
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Run one sweep. Returns the number of sessions removed.
pub fn sweep_once(store: &SessionStore, rate_limits: &RateLimits, metrics: &RelayMetrics) -> usize {
    let removed = store.sweep_expired();
    metrics
        .sessions_expired
        .fetch_add(removed as u64, Ordering::Relaxed);
    rate_limits.shrink();

    if removed > 0 {
        tracing::info!("Cleanup: removed {} expired sessions", removed);
    } else {
        tracing::debug!("Cleanup: no expired sessions");
    }
    removed
}

/// Spawn a background cleanup task.
///
/// Returns a handle that stops the task on shutdown.
pub fn spawn_cleanup_task(
    store: Arc<SessionStore>,
    rate_limits: RateLimits,
    metrics: Arc<RelayMetrics>,
    config: CleanupConfig,
) -> CleanupHandle {
    let (shutdown, mut stop) = watch::channel(false);

    let task = tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("Cleanup task disabled");
            return;
        }

        let interval_secs = config.interval_secs;
        tracing::info!("Cleanup task started (interval: {}s)", interval_secs);

        let mut timer = interval(Duration::from_secs(interval_secs));

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    sweep_once(&store, &rate_limits, &metrics);
                }
                _ = stop.changed() => {
                    tracing::info!("Cleanup task stopped");
                    break;
                }
            }
        }
    });

    CleanupHandle { shutdown, task }
}
