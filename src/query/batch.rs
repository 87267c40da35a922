//! Multi-monitor query orchestration.
//!
//! Validates the request once at the boundary, then runs the planner per
//! monitor. One monitor's failure (unknown id, storage error) lands in
//! that monitor's slot as an inline error and never aborts its siblings.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::window::{self, WindowParams};
use super::{granularity, planner, OutputShape, QueryError, SeriesPoints};
use crate::db::{DbError, Store};
use crate::rollup::TrackerRegistry;

/// A validated-at-the-boundary batch query.
#[derive(Debug, Clone)]
pub struct BatchQuery {
    /// Granularity token: minute/hour/day/auto.
    pub granularity: String,
    pub window: WindowParams,
    pub max_points: usize,
    pub shape: OutputShape,
    /// Explicit monitor ids, or None for all active monitors.
    pub monitor_ids: Option<Vec<i64>>,
}

/// Per-monitor series with its overall summary.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSeries {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub data_points: SeriesPoints,
    pub actual_granularity: &'static str,
    pub summary: SeriesSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesSummary {
    pub uptime: f64,
    pub avg_ping: Option<f64>,
    pub total_data_points: usize,
}

/// A monitor's slot in the batch response: its series, or its error.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MonitorEntry {
    Series(MonitorSeries),
    Error { id: i64, error: String },
}

/// Echo of the resolved query parameters.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConfig {
    pub granularity: String,
    pub days: f64,
    pub max_points: usize,
    pub start_date: String,
    pub end_date: String,
    pub timestamp: String,
}

/// Batch query response.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub monitors: BTreeMap<i64, MonitorEntry>,
    pub config: BatchConfig,
}

/// Run a batch query. Returns `Err` only for validation failures; data
/// failures are reported inline per monitor.
pub fn run(
    store: &Store,
    registry: &TrackerRegistry,
    query: &BatchQuery,
    now: DateTime<Utc>,
) -> Result<BatchResponse, QueryError> {
    let window = window::resolve(&query.window, now)?;
    let resolution = granularity::resolve(&query.granularity, window.days)?;

    let monitor_ids = match &query.monitor_ids {
        Some(ids) => ids.clone(),
        None => store.get_active_monitor_ids()?,
    };

    let mut monitors = BTreeMap::new();
    for monitor_id in monitor_ids {
        let entry = match query_monitor(store, registry, query, monitor_id, resolution, &window, now)
        {
            Ok(series) => MonitorEntry::Series(series),
            Err(e) => {
                tracing::error!("query failed for monitor {}: {}", monitor_id, e);
                MonitorEntry::Error {
                    id: monitor_id,
                    error: e.to_string(),
                }
            }
        };
        monitors.insert(monitor_id, entry);
    }

    Ok(BatchResponse {
        monitors,
        config: BatchConfig {
            granularity: resolution.as_str().to_string(),
            days: window.days,
            max_points: query.max_points,
            start_date: window.start.to_rfc3339(),
            end_date: window.end.to_rfc3339(),
            timestamp: now.to_rfc3339(),
        },
    })
}

fn query_monitor(
    store: &Store,
    registry: &TrackerRegistry,
    query: &BatchQuery,
    monitor_id: i64,
    resolution: crate::rollup::Resolution,
    window: &super::window::ResolvedWindow,
    now: DateTime<Utc>,
) -> Result<MonitorSeries, QueryError> {
    let monitor = match store.get_monitor(monitor_id) {
        Ok(m) => m,
        Err(DbError::NotFound) => return Err(QueryError::MonitorNotFound),
        Err(e) => return Err(e.into()),
    };

    let tracker = registry.tracker(monitor_id);
    let guard = tracker.lock().unwrap();
    let planned = planner::plan(
        store,
        &guard,
        monitor_id,
        resolution,
        window,
        query.max_points,
        query.shape,
        now,
    )?;
    drop(guard);

    let total_data_points = planned.points.len();
    Ok(MonitorSeries {
        id: monitor_id,
        name: monitor.name,
        url: monitor.url,
        data_points: planned.points,
        actual_granularity: planned.resolution.as_str(),
        summary: SeriesSummary {
            uptime: planned.summary.uptime,
            avg_ping: planned.summary.avg_ping,
            total_data_points,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Monitor;
    use crate::heartbeat::Status;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use tempfile::NamedTempFile;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn setup() -> (NamedTempFile, Store, TrackerRegistry, Vec<i64>) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let registry = TrackerRegistry::new();

        let mut ids = Vec::new();
        for (i, name) in ["one", "two"].iter().enumerate() {
            let mut monitor = Monitor {
                name: name.to_string(),
                push_token: format!("tok-{}", i),
                ..Default::default()
            };
            let id = store.add_monitor(&mut monitor).unwrap();
            let tracker = registry.tracker(id);
            tracker.lock().unwrap().ingest_at(
                now() - ChronoDuration::minutes(1),
                Status::Up,
                Some(25.0),
            );
            ids.push(id);
        }
        (tmp, store, registry, ids)
    }

    fn hour_query(monitor_ids: Option<Vec<i64>>) -> BatchQuery {
        BatchQuery {
            granularity: "hour".to_string(),
            window: WindowParams {
                days: 1.0,
                ..Default::default()
            },
            max_points: 100,
            shape: OutputShape::Ratio,
            monitor_ids,
        }
    }

    #[test]
    fn test_partial_failure_keeps_siblings() {
        let (_tmp, store, registry, ids) = setup();

        let mut requested = ids.clone();
        requested.push(999);
        let response = run(&store, &registry, &hour_query(Some(requested)), now()).unwrap();

        assert_eq!(response.monitors.len(), 3);
        for id in &ids {
            assert!(matches!(
                response.monitors.get(id),
                Some(MonitorEntry::Series(_))
            ));
        }
        match response.monitors.get(&999) {
            Some(MonitorEntry::Error { id, error }) => {
                assert_eq!(*id, 999);
                assert!(error.contains("not found"));
            }
            other => panic!("expected error entry, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults_to_active_monitors() {
        let (_tmp, store, registry, ids) = setup();
        let response = run(&store, &registry, &hour_query(None), now()).unwrap();
        assert_eq!(response.monitors.len(), ids.len());
        assert_eq!(response.config.granularity, "hour");
    }

    #[test]
    fn test_validation_error_rejects_request() {
        let (_tmp, store, registry, _ids) = setup();

        let mut query = hour_query(None);
        query.window.days = 31.0;
        assert!(matches!(
            run(&store, &registry, &query, now()),
            Err(QueryError::WindowTooLarge("hour", 30))
        ));

        let mut query = hour_query(None);
        query.granularity = "fortnight".to_string();
        assert!(matches!(
            run(&store, &registry, &query, now()),
            Err(QueryError::UnknownGranularity(_))
        ));
    }

    #[test]
    fn test_series_summary_shape() {
        let (_tmp, store, registry, ids) = setup();
        let response = run(&store, &registry, &hour_query(Some(vec![ids[0]])), now()).unwrap();

        match response.monitors.get(&ids[0]) {
            Some(MonitorEntry::Series(series)) => {
                assert_eq!(series.actual_granularity, "hour");
                assert!((series.summary.uptime - 1.0).abs() < 1e-9);
                assert_eq!(series.summary.avg_ping, Some(25.0));
                assert_eq!(series.summary.total_data_points, series.data_points.len());
            }
            other => panic!("expected series entry, got {:?}", other),
        }
    }
}
