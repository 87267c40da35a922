//! Granularity token resolution.
//!
//! Maps a requested granularity token ("minute"/"hour"/"day"/"auto") and a
//! window length onto a concrete resolution, enforcing the per-resolution
//! lookback ceiling. The ceiling check is the single place window cost is
//! bounded, and it applies to both the live and historical query paths.

use super::QueryError;
use crate::rollup::Resolution;

/// Maximum lookback in days for each resolution. Queries beyond the
/// ceiling are rejected, not clamped.
pub fn max_lookback_days(resolution: Resolution) -> u32 {
    match resolution {
        Resolution::Minute => 365,
        Resolution::Hour => 30,
        Resolution::Day => 365,
    }
}

/// Reject a window that exceeds the resolution's lookback ceiling.
pub fn check_window(resolution: Resolution, window_days: f64) -> Result<(), QueryError> {
    let ceiling = max_lookback_days(resolution);
    if window_days > ceiling as f64 {
        return Err(QueryError::WindowTooLarge(resolution.as_str(), ceiling));
    }
    Ok(())
}

/// Resolve a granularity token against a window length.
pub fn resolve(token: &str, window_days: f64) -> Result<Resolution, QueryError> {
    let resolution = match token.to_ascii_lowercase().as_str() {
        "minute" => Resolution::Minute,
        "hour" => Resolution::Hour,
        "day" => Resolution::Day,
        "auto" => {
            if window_days <= 1.0 {
                Resolution::Minute
            } else if window_days <= 30.0 {
                Resolution::Hour
            } else {
                Resolution::Day
            }
        }
        other => return Err(QueryError::UnknownGranularity(other.to_string())),
    };

    check_window(resolution, window_days)?;
    Ok(resolution)
}
