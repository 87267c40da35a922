//! Query window resolution.
//!
//! A window can be requested three ways, resolved in this precedence:
//! a single calendar date (full day), explicit start and/or end timestamps
//! (end defaults to now), or a day-count relative to now. The resolved
//! window carries its fractional day length explicitly; no later stage
//! re-derives it from request fields.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::QueryError;

/// Raw window request fields, as they arrive at the boundary.
#[derive(Debug, Clone, Default)]
pub struct WindowParams {
    /// Single calendar date (YYYY-MM-DD), shorthand for that full day.
    pub date: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Day-count relative to now; used when no explicit dates are given.
    pub days: f64,
}

/// A concrete query window.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Window length in fractional days.
    pub days: f64,
    /// True when the caller pinned the window with explicit dates; such
    /// windows read durable history instead of live rollups.
    pub explicit: bool,
}

/// Resolve the raw request fields into a concrete window.
pub fn resolve(params: &WindowParams, now: DateTime<Utc>) -> Result<ResolvedWindow, QueryError> {
    if let Some(date) = &params.date {
        let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| QueryError::InvalidDate(date.clone()))?;
        let start = day.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let end = day.and_hms_opt(23, 59, 59).unwrap().and_utc();
        return Ok(ResolvedWindow {
            start,
            end,
            days: 1.0,
            explicit: true,
        });
    }

    if let Some(start_str) = &params.start_date {
        let start = parse_datetime(start_str)?;
        let end = match &params.end_date {
            Some(end_str) => parse_datetime(end_str)?,
            None => now,
        };
        if end < start {
            return Err(QueryError::InvertedRange);
        }
        let days = (end - start).num_seconds() as f64 / 86400.0;
        return Ok(ResolvedWindow {
            start,
            end,
            days,
            explicit: true,
        });
    }

    if let Some(end_str) = &params.end_date {
        // End without start is not a meaningful window
        return Err(QueryError::InvalidDate(end_str.clone()));
    }

    let days = if params.days > 0.0 { params.days } else { 1.0 };
    // Day counts past any representable window fail construction here and
    // surface as a validation error instead of a panic.
    let start = chrono::Duration::try_seconds((days * 86400.0) as i64)
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or(QueryError::WindowTooLarge("day", 365))?;
    Ok(ResolvedWindow {
        start,
        end: now,
        days,
        explicit: false,
    })
}

/// Parse an RFC 3339 timestamp, a bare `YYYY-MM-DDTHH:MM:SS`, or a plain
/// calendar date (taken as midnight UTC).
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, QueryError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.and_utc());
    }
    if let Ok(day) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(day.and_hms_opt(0, 0, 0).unwrap().and_utc());
    }
    Err(QueryError::InvalidDate(s.to_string()))
}
