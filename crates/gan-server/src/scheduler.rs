//! Periodic cleanup timer (§9, §5): a single scheduled task started at startup that reaps
//! stale session files. Never blocks request-handling paths and survives individual
//! cleanup failures — one bad sweep logs and waits for the next tick rather than aborting.

use chrono::Duration as ChronoDuration;
use gan_session::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Spawn the reaper loop on the current Tokio runtime. Returns immediately; the task runs
/// until `shutdown` is cancelled.
pub fn spawn_session_reaper(
    store: Arc<SessionStore>,
    interval: Duration,
    max_age: ChronoDuration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("session reaper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match store.reap(chrono::Utc::now(), max_age) {
                        Ok(count) if count > 0 => info!(reaped = count, "session reaper swept stale sessions"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "session reaper sweep failed; will retry next tick"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reaper_sweeps_on_each_tick_and_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SessionStore::new(dir.path()).unwrap());
        store.get_or_create("S1", None).unwrap();

        let shutdown = CancellationToken::new();
        let handle = spawn_session_reaper(
            store.clone(),
            Duration::from_millis(10),
            ChronoDuration::days(7),
            shutdown.clone(),
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

        // nothing stale yet, session should still exist
        assert!(store.get_or_create("S1", None).is_ok());
    }
}
