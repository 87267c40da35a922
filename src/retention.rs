//! Retention manager for cleaning up old heartbeats.
//!
//! Durable heartbeats only need to cover the deepest query lookback
//! (365 days); anything older is deleted by a periodic sweep.

use crate::db::Store;

use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;

/// Days of heartbeat history kept, matching the deepest lookback ceiling.
const RETENTION_DAYS: i64 = 365;

/// Manager for deleting heartbeats past the retention period.
pub struct RetentionManager {
    store: Store,
}

impl RetentionManager {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Start the retention background task.
    pub fn start(&self) {
        let store = self.store.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));

            loop {
                interval.tick().await;
                sweep(&store);
            }
        });
    }
}

fn sweep(store: &Store) {
    let monitors = match store.get_monitors() {
        Ok(m) => m,
        Err(e) => {
            tracing::error!("RetentionManager: Failed to get monitors: {}", e);
            return;
        }
    };

    let cutoff = Utc::now() - ChronoDuration::days(RETENTION_DAYS);

    for monitor in monitors {
        if let Err(e) = store.delete_heartbeats_before(monitor.id, cutoff) {
            tracing::error!(
                "RetentionManager: Failed to delete heartbeats for {}: {}",
                monitor.name,
                e
            );
        }
    }
}
