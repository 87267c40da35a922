//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::heartbeat::Status;

/// A monitored target configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub push_token: String,
    pub active: bool,
    /// Retry budget: consecutive failing checks tolerated before DOWN.
    pub max_retries: u32,
    /// Re-notify after this many consecutive DOWN beats (0 = never).
    pub resend_interval: u32,
    /// Healthy state is defined as "check fails".
    pub inverted: bool,
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            url: String::new(),
            push_token: String::new(),
            active: true,
            max_retries: 0,
            resend_interval: 0,
            inverted: false,
        }
    }
}

/// One stored health-check result.
#[derive(Debug, Clone, Serialize)]
pub struct Heartbeat {
    pub id: i64,
    pub monitor_id: i64,
    pub time: DateTime<Utc>,
    pub status: Status,
    pub msg: String,
    /// Latency in milliseconds, if the check produced one.
    pub ping: Option<f64>,
    pub retries: u32,
    pub down_count: u32,
    /// Seconds since the previous beat for this monitor.
    pub duration: i64,
    /// Notable transition flag (first beat or status change).
    pub important: bool,
}

/// A scheduled maintenance window for a monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub id: i64,
    pub monitor_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub active: bool,
}
