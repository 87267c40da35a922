//! Heartbeat ingestion.
//!
//! One beat at a time per monitor: the monitor's tracker mutex is held
//! for the whole read-previous / transition / persist sequence, so the
//! retry counter never races. Different monitors ingest in parallel.

use chrono::{DateTime, Utc};

use super::{is_notable_transition, next_status, PreviousBeat, Status};
use crate::db::{DbError, Heartbeat, Monitor, Store};
use crate::rollup::TrackerRegistry;

/// Outcome of one ingested beat, for the caller's notification dispatch.
#[derive(Debug)]
pub struct BeatOutcome {
    pub heartbeat: Heartbeat,
    /// First beat or a change of status category.
    pub notable: bool,
    /// Still DOWN and the resend interval was reached again.
    pub resend_due: bool,
}

/// Processes raw signals into stored heartbeats and live rollups.
#[derive(Clone)]
pub struct Ingestor {
    store: Store,
    registry: TrackerRegistry,
}

impl Ingestor {
    pub fn new(store: Store, registry: TrackerRegistry) -> Self {
        Self { store, registry }
    }

    /// Process one raw up/down signal for a monitor.
    pub fn process_beat(
        &self,
        monitor: &Monitor,
        raw: Status,
        ping: Option<f64>,
        msg: &str,
        now: DateTime<Utc>,
    ) -> Result<BeatOutcome, DbError> {
        let tracker = self.registry.tracker(monitor.id);
        // Per-monitor serialization point: transition reads the previous
        // beat, so a second in-flight beat for the same monitor must wait.
        let mut tracker = tracker.lock().unwrap();

        let previous = self.store.get_previous_heartbeat(monitor.id)?;
        let is_first = previous.is_none();
        let duration = previous
            .as_ref()
            .map(|p| (now - p.time).num_seconds())
            .unwrap_or(0);

        let mut msg = msg.to_string();
        let (status, retries) = if self.store.is_under_maintenance(monitor.id, now)? {
            // Maintenance override: the transition engine is not consulted
            msg = "Monitor under maintenance".to_string();
            (Status::Maintenance, 0)
        } else {
            let transition = next_status(
                raw,
                previous.as_ref().map(|p| PreviousBeat {
                    status: p.status,
                    retries: p.retries,
                }),
                monitor.max_retries,
                monitor.inverted,
            );
            (transition.status, transition.retries)
        };

        let notable =
            is_notable_transition(is_first, previous.as_ref().map(|p| p.status), status);

        let mut down_count = previous.as_ref().map(|p| p.down_count).unwrap_or(0);
        let mut resend_due = false;
        if notable {
            down_count = 0;
        } else if status == Status::Down && monitor.resend_interval > 0 {
            down_count += 1;
            if down_count >= monitor.resend_interval {
                resend_due = true;
                down_count = 0;
            }
        }

        tracker.ingest_at(now, status, ping);

        let mut heartbeat = Heartbeat {
            id: 0,
            monitor_id: monitor.id,
            time: now,
            status,
            msg,
            ping,
            retries,
            down_count,
            duration,
            important: notable,
        };
        heartbeat.id = self.store.add_heartbeat(&heartbeat)?;

        tracing::debug!(
            "beat for {}: {:?} (retries={}, notable={})",
            monitor.name,
            status,
            retries,
            notable
        );

        Ok(BeatOutcome {
            heartbeat,
            notable,
            resend_due,
        })
    }

    /// Rebuild live rollups from stored heartbeats. Called once at boot so
    /// recent-window queries survive a restart. Replays the deepest live
    /// window (a year of day buckets); ingestion prunes the minute and
    /// hour maps down to their own capacities as it goes.
    pub fn warm_start(&self, now: DateTime<Utc>) -> Result<(), DbError> {
        let monitors = self.store.get_monitors()?;
        for monitor in monitors {
            let beats =
                self.store
                    .get_heartbeats(monitor.id, now - chrono::Duration::days(365), now)?;
            if beats.is_empty() {
                continue;
            }

            let tracker = self.registry.tracker(monitor.id);
            let mut tracker = tracker.lock().unwrap();
            let count = beats.len();
            for beat in beats {
                tracker.ingest_at(beat.time, beat.status, beat.ping);
            }
            tracing::info!("warmed rollups for {} from {} beats", monitor.name, count);
        }
        Ok(())
    }
}
