//! In-memory per-monitor rollups.
//!
//! Each monitor gets an `UptimeTracker` holding minute, hour, and day
//! buckets over a bounded live window (one day of minutes, 30 days of
//! hours, a year of days). Ingestion accumulates into the current period's
//! bucket at every resolution; reads produce continuous recent sequences,
//! named-window summaries, and bounded display buckets.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use crate::heartbeat::Status;

/// A rollup period length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    Minute,
    Hour,
    Day,
}

impl Resolution {
    pub fn period_seconds(self) -> i64 {
        match self {
            Resolution::Minute => 60,
            Resolution::Hour => 3600,
            Resolution::Day => 86400,
        }
    }

    pub fn periods_per_day(self) -> u32 {
        match self {
            Resolution::Minute => 1440,
            Resolution::Hour => 24,
            Resolution::Day => 1,
        }
    }

    /// Number of periods kept live in memory.
    pub fn live_capacity(self) -> usize {
        match self {
            Resolution::Minute => 1440,
            Resolution::Hour => 720,
            Resolution::Day => 365,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::Minute => "minute",
            Resolution::Hour => "hour",
            Resolution::Day => "day",
        }
    }
}

/// Truncate a datetime to the start of its containing period.
pub fn truncate_to_period(dt: DateTime<Utc>, resolution: Resolution) -> i64 {
    let ts = dt.timestamp();
    ts - ts.rem_euclid(resolution.period_seconds())
}

/// One fixed-period aggregate of heartbeat counts and latency.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bucket {
    pub up: u64,
    pub down: u64,
    pub pending: u64,
    pub maintenance: u64,
    pub ping_sum: f64,
    pub ping_count: u64,
}

impl Bucket {
    pub fn add(&mut self, status: Status, ping: Option<f64>) {
        match status {
            Status::Up => self.up += 1,
            Status::Down => self.down += 1,
            Status::Pending => self.pending += 1,
            Status::Maintenance => self.maintenance += 1,
        }
        if let Some(p) = ping {
            self.ping_sum += p;
            self.ping_count += 1;
        }
    }

    pub fn merge(&mut self, other: &Bucket) {
        self.up += other.up;
        self.down += other.down;
        self.pending += other.pending;
        self.maintenance += other.maintenance;
        self.ping_sum += other.ping_sum;
        self.ping_count += other.ping_count;
    }

    pub fn total(&self) -> u64 {
        self.up + self.down + self.pending + self.maintenance
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn uptime_ratio(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.up as f64 / total as f64
        }
    }

    pub fn downtime_ratio(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.down as f64 / total as f64
        }
    }

    pub fn avg_ping(&self) -> Option<f64> {
        if self.ping_count == 0 {
            None
        } else {
            Some(self.ping_sum / self.ping_count as f64)
        }
    }

    /// Representative status for display, priority DOWN > MAINTENANCE >
    /// PENDING > UP. An all-zero bucket has no status: it means no
    /// observation in the period, not a healthy one.
    pub fn representative_status(&self) -> Option<Status> {
        if self.down > 0 {
            Some(Status::Down)
        } else if self.maintenance > 0 {
            Some(Status::Maintenance)
        } else if self.pending > 0 {
            Some(Status::Pending)
        } else if self.up > 0 {
            Some(Status::Up)
        } else {
            None
        }
    }
}

/// Aggregate uptime/latency over a whole window.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct WindowSummary {
    pub uptime: f64,
    pub avg_ping: Option<f64>,
}

impl WindowSummary {
    /// Summary over a single merged bucket. Uptime is up/(up+down);
    /// pending and maintenance observations don't count against it.
    pub fn from_bucket(total: &Bucket) -> Self {
        let denom = total.up + total.down;
        Self {
            uptime: if denom == 0 {
                0.0
            } else {
                total.up as f64 / denom as f64
            },
            avg_ping: total.avg_ping(),
        }
    }
}

/// A merged display bucket covering [start, end).
#[derive(Debug, Clone)]
pub struct DisplayBucket {
    pub start: i64,
    pub end: i64,
    pub bucket: Bucket,
}

/// Live rollups for a single monitor.
#[derive(Debug, Default)]
pub struct UptimeTracker {
    minute: BTreeMap<i64, Bucket>,
    hour: BTreeMap<i64, Bucket>,
    day: BTreeMap<i64, Bucket>,
}

impl UptimeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn buckets(&self, resolution: Resolution) -> &BTreeMap<i64, Bucket> {
        match resolution {
            Resolution::Minute => &self.minute,
            Resolution::Hour => &self.hour,
            Resolution::Day => &self.day,
        }
    }

    fn buckets_mut(&mut self, resolution: Resolution) -> &mut BTreeMap<i64, Bucket> {
        match resolution {
            Resolution::Minute => &mut self.minute,
            Resolution::Hour => &mut self.hour,
            Resolution::Day => &mut self.day,
        }
    }

    /// Record a status observation into the current period at every
    /// resolution.
    pub fn ingest(&mut self, status: Status, ping: Option<f64>) {
        self.ingest_at(Utc::now(), status, ping);
    }

    /// Record a status observation at an explicit time.
    pub fn ingest_at(&mut self, time: DateTime<Utc>, status: Status, ping: Option<f64>) {
        for resolution in [Resolution::Minute, Resolution::Hour, Resolution::Day] {
            let key = truncate_to_period(time, resolution);
            let buckets = self.buckets_mut(resolution);
            buckets.entry(key).or_default().add(status, ping);

            // Prune periods that fell out of the live window
            let cutoff =
                key - (resolution.live_capacity() as i64 - 1) * resolution.period_seconds();
            while let Some((&first, _)) = buckets.first_key_value() {
                if first < cutoff {
                    buckets.pop_first();
                } else {
                    break;
                }
            }
        }
    }

    /// The most recent `count` periods ending at the period containing
    /// `now`, oldest first. Periods with no observations are present as
    /// empty buckets so the sequence is continuous.
    pub fn read_recent(
        &self,
        resolution: Resolution,
        count: usize,
        now: DateTime<Utc>,
    ) -> Vec<(i64, Bucket)> {
        let count = count.min(resolution.live_capacity());
        let current = truncate_to_period(now, resolution);
        let period = resolution.period_seconds();
        let buckets = self.buckets(resolution);

        (0..count)
            .rev()
            .map(|i| {
                let key = current - i as i64 * period;
                (key, buckets.get(&key).cloned().unwrap_or_default())
            })
            .collect()
    }

    /// Aggregate the last `count` periods into one summary.
    fn summarize(&self, resolution: Resolution, count: usize, now: DateTime<Utc>) -> WindowSummary {
        let mut total = Bucket::default();
        for (_, bucket) in self.read_recent(resolution, count, now) {
            total.merge(&bucket);
        }
        WindowSummary::from_bucket(&total)
    }

    /// Precomputed last-24-hours summary.
    pub fn last_24h(&self, now: DateTime<Utc>) -> WindowSummary {
        self.summarize(Resolution::Minute, 1440, now)
    }

    /// Precomputed last-7-days summary.
    pub fn last_7d(&self, now: DateTime<Utc>) -> WindowSummary {
        self.summarize(Resolution::Hour, 168, now)
    }

    /// Precomputed last-30-days summary.
    pub fn last_30d(&self, now: DateTime<Utc>) -> WindowSummary {
        self.summarize(Resolution::Hour, 720, now)
    }

    /// Summary over an arbitrary recent day count at the given resolution,
    /// bounded by the live capacity.
    pub fn read_custom(
        &self,
        day_count: u32,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> WindowSummary {
        let periods = (day_count as usize).saturating_mul(resolution.periods_per_day() as usize);
        self.summarize(resolution, periods, now)
    }

    /// At most `max_points` merged buckets covering the last `day_count`
    /// days. Bounded by construction: the caller's count is the output
    /// budget, so no downsampling pass is needed afterwards.
    pub fn aggregated_buckets(
        &self,
        day_count: f64,
        max_points: usize,
        now: DateTime<Utc>,
    ) -> Vec<DisplayBucket> {
        if max_points == 0 || day_count <= 0.0 {
            return Vec::new();
        }

        let resolution = if day_count <= 1.0 {
            Resolution::Minute
        } else if day_count <= 30.0 {
            Resolution::Hour
        } else {
            Resolution::Day
        };

        let periods = ((day_count * resolution.periods_per_day() as f64).ceil() as usize)
            .max(1)
            .min(resolution.live_capacity());
        let recent = self.read_recent(resolution, periods, now);
        let chunk = periods.div_ceil(max_points).max(1);
        let period_secs = resolution.period_seconds();

        recent
            .chunks(chunk)
            .map(|slice| {
                let mut merged = Bucket::default();
                for (_, bucket) in slice {
                    merged.merge(bucket);
                }
                let start = slice[0].0;
                let end = slice[slice.len() - 1].0 + period_secs;
                DisplayBucket {
                    start,
                    end,
                    bucket: merged,
                }
            })
            .collect()
    }
}

/// Shared registry handing out one tracker per monitor.
///
/// The per-monitor mutex is the serialization point for ingestion: beats
/// for one monitor are processed one at a time, while different monitors
/// proceed independently.
#[derive(Clone, Default)]
pub struct TrackerRegistry {
    inner: Arc<RwLock<HashMap<i64, Arc<Mutex<UptimeTracker>>>>>,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the tracker for a monitor.
    pub fn tracker(&self, monitor_id: i64) -> Arc<Mutex<UptimeTracker>> {
        if let Some(tracker) = self.inner.read().unwrap().get(&monitor_id) {
            return tracker.clone();
        }
        let mut map = self.inner.write().unwrap();
        map.entry(monitor_id)
            .or_insert_with(|| Arc::new(Mutex::new(UptimeTracker::new())))
            .clone()
    }

    /// Drop a monitor's tracker (after monitor deletion).
    pub fn remove(&self, monitor_id: i64) {
        self.inner.write().unwrap().remove(&monitor_id);
    }
}
