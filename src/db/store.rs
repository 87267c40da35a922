//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::models::*;
use crate::heartbeat::Status;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Not found")]
    NotFound,
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;

        Ok(())
    }

    // --- Monitor CRUD ---

    /// Add a new monitor and return its ID.
    pub fn add_monitor(&self, monitor: &mut Monitor) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO monitors (name, url, push_token, active, max_retries, resend_interval, inverted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                monitor.name,
                monitor.url,
                monitor.push_token,
                monitor.active,
                monitor.max_retries,
                monitor.resend_interval,
                monitor.inverted,
            ],
        )?;
        let id = conn.last_insert_rowid();
        monitor.id = id;
        Ok(id)
    }

    /// Update an existing monitor.
    pub fn update_monitor(&self, monitor: &Monitor) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE monitors SET name=?1, url=?2, push_token=?3, active=?4,
             max_retries=?5, resend_interval=?6, inverted=?7 WHERE id=?8",
            params![
                monitor.name,
                monitor.url,
                monitor.push_token,
                monitor.active,
                monitor.max_retries,
                monitor.resend_interval,
                monitor.inverted,
                monitor.id,
            ],
        )?;
        Ok(())
    }

    /// Get all monitors.
    pub fn get_monitors(&self) -> Result<Vec<Monitor>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, url, push_token, active, max_retries, resend_interval, inverted
             FROM monitors",
        )?;

        let monitors = stmt
            .query_map([], map_monitor_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(monitors)
    }

    /// Get the IDs of all active monitors.
    pub fn get_active_monitor_ids(&self) -> Result<Vec<i64>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id FROM monitors WHERE active = 1")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(ids)
    }

    /// Get a monitor by ID.
    pub fn get_monitor(&self, id: i64) -> Result<Monitor, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, url, push_token, active, max_retries, resend_interval, inverted
             FROM monitors WHERE id = ?1",
            params![id],
            map_monitor_row,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    /// Get an active monitor by its push token.
    pub fn get_monitor_by_token(&self, token: &str) -> Result<Monitor, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, url, push_token, active, max_retries, resend_interval, inverted
             FROM monitors WHERE push_token = ?1 AND active = 1",
            params![token],
            map_monitor_row,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    /// Delete a monitor and its heartbeats.
    pub fn delete_monitor(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM heartbeats WHERE monitor_id = ?1", params![id])?;
        conn.execute(
            "DELETE FROM maintenance_windows WHERE monitor_id = ?1",
            params![id],
        )?;
        conn.execute("DELETE FROM monitors WHERE id = ?1", params![id])?;
        Ok(())
    }

    // --- Heartbeats ---

    /// Insert a heartbeat and return its ID.
    pub fn add_heartbeat(&self, beat: &Heartbeat) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO heartbeats (monitor_id, time, status, msg, ping, retries, down_count, duration, important)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                beat.monitor_id,
                beat.time.format(TIME_FORMAT).to_string(),
                beat.status.code(),
                beat.msg,
                beat.ping,
                beat.retries,
                beat.down_count,
                beat.duration,
                beat.important,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get the most recent heartbeat for a monitor.
    pub fn get_previous_heartbeat(&self, monitor_id: i64) -> Result<Option<Heartbeat>, DbError> {
        let conn = self.conn.lock().unwrap();
        let beat = conn
            .query_row(
                "SELECT id, monitor_id, time, status, msg, ping, retries, down_count, duration, important
                 FROM heartbeats WHERE monitor_id = ?1 ORDER BY time DESC, id DESC LIMIT 1",
                params![monitor_id],
                map_heartbeat_row,
            )
            .optional()?;
        Ok(beat)
    }

    /// Get heartbeats for a monitor within a time range, ordered ascending.
    pub fn get_heartbeats(
        &self,
        monitor_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Heartbeat>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, monitor_id, time, status, msg, ping, retries, down_count, duration, important
             FROM heartbeats
             WHERE monitor_id = ?1 AND time >= ?2 AND time <= ?3
             ORDER BY time ASC",
        )?;

        let beats = stmt
            .query_map(
                params![
                    monitor_id,
                    start.format(TIME_FORMAT).to_string(),
                    end.format(TIME_FORMAT).to_string(),
                ],
                map_heartbeat_row,
            )?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(beats)
    }

    /// Delete heartbeats before a cutoff time.
    pub fn delete_heartbeats_before(
        &self,
        monitor_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM heartbeats WHERE monitor_id = ?1 AND time < ?2",
            params![monitor_id, cutoff.format(TIME_FORMAT).to_string()],
        )?;
        Ok(())
    }

    // --- Maintenance windows ---

    /// Add a maintenance window and return its ID.
    pub fn add_maintenance_window(&self, window: &mut MaintenanceWindow) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO maintenance_windows (monitor_id, start_time, end_time, active)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                window.monitor_id,
                window.start_time.format(TIME_FORMAT).to_string(),
                window.end_time.format(TIME_FORMAT).to_string(),
                window.active,
            ],
        )?;
        let id = conn.last_insert_rowid();
        window.id = id;
        Ok(id)
    }

    /// Whether the monitor has an active maintenance window covering `at`.
    pub fn is_under_maintenance(
        &self,
        monitor_id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM maintenance_windows
             WHERE monitor_id = ?1 AND active = 1 AND start_time <= ?2 AND end_time >= ?2",
            params![monitor_id, at.format(TIME_FORMAT).to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

fn map_monitor_row(row: &rusqlite::Row<'_>) -> SqlResult<Monitor> {
    Ok(Monitor {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        push_token: row.get(3)?,
        active: row.get(4)?,
        max_retries: row.get(5)?,
        resend_interval: row.get(6)?,
        inverted: row.get(7)?,
    })
}

fn map_heartbeat_row(row: &rusqlite::Row<'_>) -> SqlResult<Heartbeat> {
    let time_str: String = row.get(2)?;
    let time = parse_db_time(&time_str).unwrap_or_else(Utc::now);
    let status_code: u8 = row.get(3)?;

    Ok(Heartbeat {
        id: row.get(0)?,
        monitor_id: row.get(1)?,
        time,
        status: Status::from_code(status_code).unwrap_or(Status::Down),
        msg: row.get(4)?,
        ping: row.get(5)?,
        retries: row.get(6)?,
        down_count: row.get(7)?,
        duration: row.get(8)?,
        important: row.get(9)?,
    })
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    // Try various formats
    let formats = [
        "%Y-%m-%d %H:%M:%S%.9f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.9fZ",
        "%Y-%m-%dT%H:%M:%SZ",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    // Try ISO 8601
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::NamedTempFile;

    fn open_store() -> (NamedTempFile, Store) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        (tmp, store)
    }

    #[test]
    fn test_monitor_crud() {
        let (_tmp, store) = open_store();

        // Create
        let mut monitor = Monitor {
            name: "Test".to_string(),
            url: "https://example.com".to_string(),
            push_token: "tok-1".to_string(),
            max_retries: 3,
            ..Default::default()
        };
        let id = store.add_monitor(&mut monitor).unwrap();
        assert!(id > 0);

        // Read
        let fetched = store.get_monitor(id).unwrap();
        assert_eq!(fetched.name, "Test");
        assert_eq!(fetched.max_retries, 3);

        // Lookup by token
        let by_token = store.get_monitor_by_token("tok-1").unwrap();
        assert_eq!(by_token.id, id);

        // Update
        let mut updated = fetched;
        updated.name = "Updated".to_string();
        store.update_monitor(&updated).unwrap();
        assert_eq!(store.get_monitor(id).unwrap().name, "Updated");

        // Delete
        store.delete_monitor(id).unwrap();
        assert!(matches!(store.get_monitor(id), Err(DbError::NotFound)));
    }

    #[test]
    fn test_inactive_monitor_token_not_found() {
        let (_tmp, store) = open_store();

        let mut monitor = Monitor {
            name: "Paused".to_string(),
            push_token: "tok-paused".to_string(),
            active: false,
            ..Default::default()
        };
        store.add_monitor(&mut monitor).unwrap();

        assert!(matches!(
            store.get_monitor_by_token("tok-paused"),
            Err(DbError::NotFound)
        ));
    }

    #[test]
    fn test_heartbeat_insert_and_range_query() {
        let (_tmp, store) = open_store();

        let mut monitor = Monitor {
            name: "HB".to_string(),
            push_token: "tok-hb".to_string(),
            ..Default::default()
        };
        let id = store.add_monitor(&mut monitor).unwrap();

        let base = Utc::now() - ChronoDuration::minutes(10);
        for i in 0..5 {
            let beat = Heartbeat {
                id: 0,
                monitor_id: id,
                time: base + ChronoDuration::minutes(i),
                status: if i == 2 { Status::Down } else { Status::Up },
                msg: String::new(),
                ping: Some(10.0 + i as f64),
                retries: 0,
                down_count: 0,
                duration: 60,
                important: i == 0,
            };
            store.add_heartbeat(&beat).unwrap();
        }

        // Ascending order within range
        let beats = store
            .get_heartbeats(id, base, base + ChronoDuration::minutes(10))
            .unwrap();
        assert_eq!(beats.len(), 5);
        assert!(beats.windows(2).all(|w| w[0].time <= w[1].time));
        assert_eq!(beats[2].status, Status::Down);

        // Previous beat is the latest
        let prev = store.get_previous_heartbeat(id).unwrap().unwrap();
        assert_eq!(prev.time, base + ChronoDuration::minutes(4));

        // Partial range
        let partial = store
            .get_heartbeats(id, base + ChronoDuration::minutes(3), base + ChronoDuration::minutes(10))
            .unwrap();
        assert_eq!(partial.len(), 2);
    }

    #[test]
    fn test_maintenance_window_check() {
        let (_tmp, store) = open_store();

        let mut monitor = Monitor {
            name: "MW".to_string(),
            push_token: "tok-mw".to_string(),
            ..Default::default()
        };
        let id = store.add_monitor(&mut monitor).unwrap();

        let now = Utc::now();
        let mut window = MaintenanceWindow {
            id: 0,
            monitor_id: id,
            start_time: now - ChronoDuration::hours(1),
            end_time: now + ChronoDuration::hours(1),
            active: true,
        };
        store.add_maintenance_window(&mut window).unwrap();

        assert!(store.is_under_maintenance(id, now).unwrap());
        assert!(!store
            .is_under_maintenance(id, now + ChronoDuration::hours(2))
            .unwrap());
        // Other monitors are unaffected
        assert!(!store.is_under_maintenance(id + 1, now).unwrap());
    }
}
