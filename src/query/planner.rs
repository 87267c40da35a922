//! Query planning: choosing the data path and shaping points.
//!
//! Recent default-range windows read the live rollup tracker directly;
//! explicit date ranges (and minute-level windows past the live day) fold
//! raw heartbeats from durable storage into synthetic buckets of the
//! requested resolution. Both paths produce the same point model, capped
//! by the caller's point budget.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::window::ResolvedWindow;
use super::{downsample, DataPoint, DisplayBeat, OutputShape, QueryError, SeriesPoints};
use crate::db::Store;
use crate::rollup::{truncate_to_period, Bucket, Resolution, UptimeTracker, WindowSummary};

/// Planned series for one monitor.
#[derive(Debug)]
pub struct PlannedSeries {
    pub resolution: Resolution,
    pub points: SeriesPoints,
    pub summary: WindowSummary,
}

/// Plan and execute a query for one monitor.
///
/// `resolution` must already have passed the granularity ceiling check for
/// this window; the planner only chooses the data path and shapes points.
pub fn plan(
    store: &Store,
    tracker: &UptimeTracker,
    monitor_id: i64,
    resolution: Resolution,
    window: &ResolvedWindow,
    max_points: usize,
    shape: OutputShape,
    now: DateTime<Utc>,
) -> Result<PlannedSeries, QueryError> {
    if shape == OutputShape::Display {
        // The display shape is bounded by construction: the point budget
        // is handed to the aggregator as the bucket count, so the
        // downsampler is skipped.
        let beats: Vec<DisplayBeat> = tracker
            .aggregated_buckets(window.days, max_points, now)
            .into_iter()
            .map(|display| match display.bucket.representative_status() {
                None => DisplayBeat::empty(),
                Some(status) => DisplayBeat::Beat {
                    status,
                    time: format_ts(display.end),
                    msg: String::new(),
                    ping: display.bucket.avg_ping(),
                },
            })
            .collect();

        let summary = recent_summary(tracker, window.days, now);
        return Ok(PlannedSeries {
            resolution,
            points: SeriesPoints::Display(beats),
            summary,
        });
    }

    let use_tracker =
        !window.explicit && (resolution != Resolution::Minute || window.days <= 1.0);

    if use_tracker {
        let count = ((window.days * resolution.periods_per_day() as f64).ceil() as usize)
            .max(1)
            .min(resolution.live_capacity());

        let points: Vec<DataPoint> = tracker
            .read_recent(resolution, count, now)
            .into_iter()
            .map(|(timestamp, bucket)| bucket_point(timestamp, &bucket))
            .collect();

        let summary = recent_summary(tracker, window.days, now);
        return Ok(PlannedSeries {
            resolution,
            points: SeriesPoints::Ratio(downsample::limit(points, max_points)),
            summary,
        });
    }

    // Historical path: fold raw heartbeats into synthetic buckets. Durable
    // storage has no rollups, so the period grouping happens here.
    let beats = store.get_heartbeats(monitor_id, window.start, window.end)?;

    let mut folded: BTreeMap<i64, Bucket> = BTreeMap::new();
    let mut overall = Bucket::default();
    for beat in &beats {
        let key = truncate_to_period(beat.time, resolution);
        folded.entry(key).or_default().add(beat.status, beat.ping);
        overall.add(beat.status, beat.ping);
    }

    let points: Vec<DataPoint> = folded
        .iter()
        .map(|(&timestamp, bucket)| bucket_point(timestamp, bucket))
        .collect();

    let summary = if window.explicit {
        // Re-aggregate the fold; named windows don't align with pinned
        // date ranges.
        WindowSummary::from_bucket(&overall)
    } else {
        recent_summary(tracker, window.days, now)
    };

    Ok(PlannedSeries {
        resolution,
        points: SeriesPoints::Ratio(downsample::limit(points, max_points)),
        summary,
    })
}

/// Overall window summary for a recent (non-pinned) window, from the
/// aggregator's named windows where the day-count aligns.
fn recent_summary(tracker: &UptimeTracker, days: f64, now: DateTime<Utc>) -> WindowSummary {
    if days <= 1.0 {
        tracker.last_24h(now)
    } else if days <= 7.0 {
        tracker.last_7d(now)
    } else if days <= 30.0 {
        tracker.last_30d(now)
    } else {
        tracker.read_custom(days.ceil() as u32, Resolution::Day, now)
    }
}

fn bucket_point(timestamp: i64, bucket: &Bucket) -> DataPoint {
    DataPoint {
        timestamp,
        time: format_ts(timestamp),
        status: bucket.representative_status(),
        uptime: bucket.uptime_ratio(),
        downtime: bucket.downtime_ratio(),
        avg_ping: bucket.avg_ping(),
        heartbeat_count: if bucket.is_empty() {
            None
        } else {
            Some(bucket.total())
        },
    }
}

fn format_ts(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Heartbeat, Monitor};
    use crate::heartbeat::Status;
    use crate::query::window;
    use crate::query::window::WindowParams;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use tempfile::NamedTempFile;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn store_with_monitor() -> (NamedTempFile, Store, i64) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let mut monitor = Monitor {
            name: "planner".to_string(),
            push_token: "tok-planner".to_string(),
            ..Default::default()
        };
        let id = store.add_monitor(&mut monitor).unwrap();
        (tmp, store, id)
    }

    fn add_beat(store: &Store, monitor_id: i64, time: DateTime<Utc>, status: Status, ping: Option<f64>) {
        let beat = Heartbeat {
            id: 0,
            monitor_id,
            time,
            status,
            msg: String::new(),
            ping,
            retries: 0,
            down_count: 0,
            duration: 60,
            important: false,
        };
        store.add_heartbeat(&beat).unwrap();
    }

    fn recent_window(days: f64) -> ResolvedWindow {
        window::resolve(
            &WindowParams {
                days,
                ..Default::default()
            },
            now(),
        )
        .unwrap()
    }

    #[test]
    fn test_recent_path_reads_tracker() {
        let (_tmp, store, id) = store_with_monitor();
        let mut tracker = UptimeTracker::new();
        tracker.ingest_at(now() - ChronoDuration::minutes(1), Status::Up, Some(12.0));
        tracker.ingest_at(now() - ChronoDuration::minutes(2), Status::Down, None);

        let planned = plan(
            &store,
            &tracker,
            id,
            Resolution::Minute,
            &recent_window(1.0),
            2000,
            OutputShape::Ratio,
            now(),
        )
        .unwrap();

        let points = match planned.points {
            SeriesPoints::Ratio(p) => p,
            _ => panic!("expected ratio points"),
        };
        // Continuous day of minutes
        assert_eq!(points.len(), 1440);
        let down = points.iter().find(|p| p.status == Some(Status::Down)).unwrap();
        assert!((down.downtime - 1.0).abs() < 1e-9);
        let up = points.iter().find(|p| p.status == Some(Status::Up)).unwrap();
        assert_eq!(up.avg_ping, Some(12.0));
        // Untouched minutes are the empty sentinel, not a status
        assert!(points.iter().filter(|p| p.status.is_none()).count() > 1400);
    }

    #[test]
    fn test_historical_fold_matches_live_rollup() {
        let (_tmp, store, id) = store_with_monitor();
        let mut tracker = UptimeTracker::new();

        // Same observations into both the store and the live tracker
        let minute = Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 0).unwrap();
        let samples = [
            (0, Status::Up, Some(10.0)),
            (15, Status::Up, Some(20.0)),
            (30, Status::Down, None),
            (45, Status::Up, Some(30.0)),
        ];
        for (sec, status, ping) in samples {
            let t = minute + ChronoDuration::seconds(sec);
            add_beat(&store, id, t, status, ping);
            tracker.ingest_at(t, status, ping);
        }

        let params = WindowParams {
            date: Some("2024-06-01".to_string()),
            ..Default::default()
        };
        let window = window::resolve(&params, now()).unwrap();
        let planned = plan(
            &store,
            &UptimeTracker::new(),
            id,
            Resolution::Minute,
            &window,
            100,
            OutputShape::Ratio,
            now(),
        )
        .unwrap();

        let points = match planned.points {
            SeriesPoints::Ratio(p) => p,
            _ => panic!("expected ratio points"),
        };
        assert_eq!(points.len(), 1);
        let folded = &points[0];

        // Live rollup for the same minute
        let live = tracker
            .read_recent(Resolution::Minute, 1, minute)
            .pop()
            .unwrap()
            .1;

        assert_eq!(folded.timestamp, truncate_to_period(minute, Resolution::Minute));
        assert_eq!(folded.heartbeat_count, Some(live.total()));
        assert!((folded.uptime - live.uptime_ratio()).abs() < 1e-9);
        assert!((folded.downtime - live.downtime_ratio()).abs() < 1e-9);
        assert_eq!(folded.avg_ping, live.avg_ping());
    }

    #[test]
    fn test_historical_points_sorted_and_budgeted() {
        let (_tmp, store, id) = store_with_monitor();
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        for i in 0..300 {
            add_beat(
                &store,
                id,
                start + ChronoDuration::minutes(i),
                Status::Up,
                Some(i as f64),
            );
        }

        let params = WindowParams {
            start_date: Some("2024-06-01T00:00:00Z".to_string()),
            end_date: Some("2024-06-01T06:00:00Z".to_string()),
            ..Default::default()
        };
        let window = window::resolve(&params, now()).unwrap();
        let planned = plan(
            &store,
            &UptimeTracker::new(),
            id,
            Resolution::Minute,
            &window,
            50,
            OutputShape::Ratio,
            now(),
        )
        .unwrap();

        let points = match planned.points {
            SeriesPoints::Ratio(p) => p,
            _ => panic!("expected ratio points"),
        };
        assert!(points.len() <= 50);
        assert!(points.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_explicit_window_summary_from_fold() {
        let (_tmp, store, id) = store_with_monitor();
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        // 3 up, 1 down
        for i in 0..4 {
            add_beat(
                &store,
                id,
                start + ChronoDuration::minutes(i),
                if i == 3 { Status::Down } else { Status::Up },
                Some(100.0),
            );
        }

        let params = WindowParams {
            date: Some("2024-06-01".to_string()),
            ..Default::default()
        };
        let window = window::resolve(&params, now()).unwrap();
        let planned = plan(
            &store,
            &UptimeTracker::new(),
            id,
            Resolution::Hour,
            &window,
            100,
            OutputShape::Ratio,
            now(),
        )
        .unwrap();

        assert!((planned.summary.uptime - 0.75).abs() < 1e-9);
        assert_eq!(planned.summary.avg_ping, Some(100.0));
    }

    #[test]
    fn test_minute_beyond_live_day_uses_history() {
        let (_tmp, store, id) = store_with_monitor();
        // Two days ago, outside the live minute window
        let old = now() - ChronoDuration::days(2);
        add_beat(&store, id, old, Status::Down, None);

        let planned = plan(
            &store,
            &UptimeTracker::new(),
            id,
            Resolution::Minute,
            &recent_window(3.0),
            100,
            OutputShape::Ratio,
            now(),
        )
        .unwrap();

        let points = match planned.points {
            SeriesPoints::Ratio(p) => p,
            _ => panic!("expected ratio points"),
        };
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].status, Some(Status::Down));
    }

    #[test]
    fn test_display_shape_skips_downsampler() {
        let (_tmp, store, id) = store_with_monitor();
        let mut tracker = UptimeTracker::new();
        for i in 0..120 {
            tracker.ingest_at(
                now() - ChronoDuration::minutes(i),
                if i % 7 == 0 { Status::Down } else { Status::Up },
                None,
            );
        }

        let planned = plan(
            &store,
            &tracker,
            id,
            Resolution::Minute,
            &recent_window(1.0),
            40,
            OutputShape::Display,
            now(),
        )
        .unwrap();

        let beats = match planned.points {
            SeriesPoints::Display(b) => b,
            _ => panic!("expected display beats"),
        };
        assert!(beats.len() <= 40);
        // Merged slots containing any down beat show DOWN
        assert!(beats.iter().any(|b| matches!(
            b,
            DisplayBeat::Beat {
                status: Status::Down,
                ..
            }
        )));
        // Quiet slots are the empty sentinel
        assert!(beats.iter().any(|b| matches!(b, DisplayBeat::Empty(0))));
    }
}
