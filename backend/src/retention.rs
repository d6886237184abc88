//! Periodic retention pass: drops expired submissions and stale admin
//! sessions. Failures are logged and the next tick tries again.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::http::AppState;
use crate::store::StoreError;

pub const CLEANUP_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// One pass over the store and the session table.
pub async fn run_cleanup(state: &AppState) -> Result<usize, StoreError> {
    let purged = state.sessions.purge_expired(Utc::now());
    if purged > 0 {
        debug!(purged, "expired admin sessions purged");
    }

    let store = state.store.clone();
    match tokio::task::spawn_blocking(move || store.cleanup_expired()).await {
        Ok(result) => result,
        Err(e) => Err(StoreError::Io(std::io::Error::other(e))),
    }
}

/// Runs [`run_cleanup`] now and then once per `period`.
pub fn spawn_cleanup_task(state: Arc<AppState>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            // The first tick completes immediately, which covers the startup pass.
            ticker.tick().await;
            match run_cleanup(&state).await {
                Ok(0) => debug!("retention pass found nothing to remove"),
                Ok(removed) => info!(removed, "retention pass finished"),
                Err(e) => error!("retention pass failed: {e}"),
            }
        }
    })
}
