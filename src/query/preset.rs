//! Named query presets.
//!
//! A preset is pure parameter computation: it maps a preset name plus
//! optional overrides onto the (granularity, day-count, point-budget)
//! triple consumed by the planner. No I/O and no aggregation of its own.

use super::QueryError;

/// Parameters computed from a preset.
#[derive(Debug, Clone, PartialEq)]
pub struct PresetParams {
    /// Granularity token for the resolver.
    pub granularity: &'static str,
    pub days: f64,
    pub max_points: usize,
}

/// Resolve a preset name with optional day-count and interval overrides.
pub fn resolve(
    preset: &str,
    days: Option<f64>,
    interval_minutes: Option<u32>,
) -> Result<PresetParams, QueryError> {
    match preset.to_ascii_lowercase().as_str() {
        "minutely" => {
            let days = days.unwrap_or(1.0);
            Ok(PresetParams {
                granularity: "minute",
                days,
                max_points: cap_points(days * 1440.0, 1440),
            })
        }
        "hourly" => {
            let days = days.unwrap_or(7.0);
            Ok(PresetParams {
                granularity: "hour",
                days,
                max_points: cap_points(days * 24.0, 720),
            })
        }
        "daily" => {
            let days = days.unwrap_or(30.0);
            Ok(PresetParams {
                granularity: "day",
                days,
                max_points: cap_points(days, 365),
            })
        }
        "yearly" => {
            // Maximum-resolution full-year export; the caller owns the cost
            Ok(PresetParams {
                granularity: "minute",
                days: days.unwrap_or(365.0),
                max_points: 525_600,
            })
        }
        "custom" => {
            let interval = interval_minutes.ok_or(QueryError::MissingInterval)?;
            if interval == 0 {
                return Err(QueryError::MissingInterval);
            }
            let days = days.unwrap_or(7.0);
            let interval = interval as f64;

            let (granularity, max_points) = if interval < 60.0 {
                ("minute", cap_points(days * 1440.0 / interval, 1440))
            } else if interval < 1440.0 {
                ("hour", cap_points(days * 24.0 / (interval / 60.0), 720))
            } else {
                ("day", cap_points(days / (interval / 1440.0), 365))
            };

            Ok(PresetParams {
                granularity,
                days,
                max_points,
            })
        }
        other => Err(QueryError::UnknownPreset(other.to_string())),
    }
}

fn cap_points(requested: f64, cap: usize) -> usize {
    (requested.ceil().max(1.0) as usize).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minutely_defaults() {
        let p = resolve("minutely", None, None).unwrap();
        assert_eq!(p.granularity, "minute");
        assert_eq!(p.days, 1.0);
        assert_eq!(p.max_points, 1440);
    }

    #[test]
    fn test_minutely_fractional_day() {
        let p = resolve("minutely", Some(0.5), None).unwrap();
        assert_eq!(p.max_points, 720);
    }

    #[test]
    fn test_hourly_defaults_and_cap() {
        let p = resolve("hourly", None, None).unwrap();
        assert_eq!(p.granularity, "hour");
        assert_eq!(p.days, 7.0);
        assert_eq!(p.max_points, 168);

        // Over the cap
        let p = resolve("hourly", Some(60.0), None).unwrap();
        assert_eq!(p.max_points, 720);
    }

    #[test]
    fn test_daily_defaults() {
        let p = resolve("daily", None, None).unwrap();
        assert_eq!(p.granularity, "day");
        assert_eq!(p.days, 30.0);
        assert_eq!(p.max_points, 30);

        let p = resolve("daily", Some(1000.0), None).unwrap();
        assert_eq!(p.max_points, 365);
    }

    #[test]
    fn test_yearly_escape_hatch() {
        let p = resolve("yearly", None, None).unwrap();
        assert_eq!(p.granularity, "minute");
        assert_eq!(p.days, 365.0);
        assert_eq!(p.max_points, 525_600);
    }

    #[test]
    fn test_custom_interval_selects_granularity() {
        // 5-minute interval over 1 day: minute granularity, 288 points
        let p = resolve("custom", Some(1.0), Some(5)).unwrap();
        assert_eq!(p.granularity, "minute");
        assert_eq!(p.max_points, 288);

        // 2-hour interval over 7 days: hour granularity, 84 points
        let p = resolve("custom", Some(7.0), Some(120)).unwrap();
        assert_eq!(p.granularity, "hour");
        assert_eq!(p.max_points, 84);

        // 2-day interval over 60 days: day granularity, 30 points
        let p = resolve("custom", Some(60.0), Some(2880)).unwrap();
        assert_eq!(p.granularity, "day");
        assert_eq!(p.max_points, 30);
    }

    #[test]
    fn test_custom_requires_interval() {
        assert!(matches!(
            resolve("custom", Some(1.0), None),
            Err(QueryError::MissingInterval)
        ));
        assert!(matches!(
            resolve("custom", Some(1.0), Some(0)),
            Err(QueryError::MissingInterval)
        ));
    }

    #[test]
    fn test_unknown_preset() {
        assert!(matches!(
            resolve("weekly", None, None),
            Err(QueryError::UnknownPreset(_))
        ));
    }
}
