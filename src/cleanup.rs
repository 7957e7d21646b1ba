//! Scheduled cleanup of expired sessions and idle refresh handles.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::rate_limit::RateLimitConfig;
use crate::session::{RefreshCoordinator, TokenStore, now_millis};

/// Interval between cleanup runs.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Run all cleanup tasks once.
pub fn run_cleanup(store: &dyn TokenStore, coordinator: &RefreshCoordinator) {
    let purged = store.purge_expired(now_millis());
    if purged > 0 {
        info!("Cleaned up {} expired sessions", purged);
    }

    let pruned = coordinator.prune_idle();
    if pruned > 0 {
        debug!("Pruned {} idle refresh handles", pruned);
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(
    store: Arc<dyn TokenStore>,
    coordinator: Arc<RefreshCoordinator>,
    limits: Option<Arc<RateLimitConfig>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&*store, &coordinator);
            if let Some(limits) = &limits {
                limits.retain_recent();
            }
        }
    })
}
