//! Time-series query engine.
//!
//! Turns a validated query (granularity, window, point budget, output
//! shape) into an ordered point sequence per monitor: recent windows read
//! the live rollup tracker, arbitrary historical ranges fold raw
//! heartbeats into synthetic buckets, and both paths share one downsampler
//! and summary model.

pub mod batch;
pub mod downsample;
pub mod granularity;
pub mod planner;
pub mod preset;
pub mod window;

use serde::Serialize;
use thiserror::Error;

use crate::db::DbError;
use crate::heartbeat::Status;

/// Query failure taxonomy. Validation errors reject the whole request;
/// everything else is scoped to a single monitor's slot in a batch.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("invalid date format: {0} (use YYYY-MM-DD or RFC 3339)")]
    InvalidDate(String),
    #[error("end date must be after start date")]
    InvertedRange,
    #[error("invalid granularity '{0}': use 'minute', 'hour', 'day', or 'auto'")]
    UnknownGranularity(String),
    #[error("invalid preset '{0}': use 'minutely', 'hourly', 'daily', 'yearly', or 'custom'")]
    UnknownPreset(String),
    #[error("custom preset requires an 'interval' parameter (minutes between data points)")]
    MissingInterval,
    #[error("{0}-level data is only available for up to {1} days")]
    WindowTooLarge(&'static str, u32),
    #[error("monitor not found")]
    MonitorNotFound,
    #[error("storage error: {0}")]
    Store(#[from] DbError),
}

impl QueryError {
    /// Whether this error invalidates the request as a whole, as opposed
    /// to one monitor's data.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            QueryError::InvalidDate(_)
                | QueryError::InvertedRange
                | QueryError::UnknownGranularity(_)
                | QueryError::UnknownPreset(_)
                | QueryError::MissingInterval
                | QueryError::WindowTooLarge(_, _)
        )
    }
}

/// How the per-period data is shaped in the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    /// One point per period with uptime/downtime ratios and average ping.
    Ratio,
    /// One discrete representative status per display slot.
    Display,
}

/// One query-result point. Never persisted; built per query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    pub timestamp: i64,
    pub time: String,
    /// Representative status code, or null for a period with no data.
    pub status: Option<Status>,
    pub uptime: f64,
    pub downtime: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_ping: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_count: Option<u64>,
}

/// One slot of the discrete display shape. An empty slot (no observation
/// in the period) serializes as the literal `0`, distinct from a real UP
/// beat.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DisplayBeat {
    Empty(u8),
    Beat {
        status: Status,
        time: String,
        msg: String,
        ping: Option<f64>,
    },
}

impl DisplayBeat {
    pub fn empty() -> Self {
        DisplayBeat::Empty(0)
    }
}

/// Point sequence in either output shape.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SeriesPoints {
    Ratio(Vec<DataPoint>),
    Display(Vec<DisplayBeat>),
}

impl SeriesPoints {
    pub fn len(&self) -> usize {
        match self {
            SeriesPoints::Ratio(points) => points.len(),
            SeriesPoints::Display(beats) => beats.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
