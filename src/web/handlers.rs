//! HTTP request handlers.
//!
//! Thin glue: parse the request, delegate to the query engine or the
//! ingestor, serialize the result. Validation errors become 400s with the
//! specific reason; per-monitor data errors ride inline in an otherwise
//! successful response.

use super::AppState;
use crate::db::{DbError, Monitor};
use crate::heartbeat::Status;
use crate::query::batch::{self, BatchQuery};
use crate::query::preset;
use crate::query::window::WindowParams;
use crate::query::OutputShape;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

fn default_granularity() -> String {
    "hour".to_string()
}

fn default_days() -> f64 {
    1.0
}

fn default_max_points() -> usize {
    100
}

fn default_format() -> String {
    "detailed".to_string()
}

fn default_preset() -> String {
    "hourly".to_string()
}

fn default_push_status() -> String {
    "up".to_string()
}

fn default_push_msg() -> String {
    "OK".to_string()
}

/// Comma-separated monitor id list; non-numeric entries are dropped.
fn parse_monitor_ids(raw: &Option<String>) -> Option<Vec<i64>> {
    raw.as_ref().map(|s| {
        s.split(',')
            .filter_map(|part| part.trim().parse().ok())
            .collect()
    })
}

fn error_response(status: StatusCode, msg: String) -> axum::response::Response {
    (status, Json(json!({ "ok": false, "msg": msg }))).into_response()
}

// ============================================================================
// API: Time-series queries
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    #[serde(default = "default_granularity")]
    pub granularity: String,
    #[serde(default = "default_days")]
    pub days: f64,
    #[serde(default = "default_max_points")]
    pub max_points: usize,
    #[serde(default)]
    pub monitor_ids: Option<String>,
    /// "detailed" for ratio points, "heartbeat" for discrete beats.
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

pub async fn handle_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> impl IntoResponse {
    let shape = match query.format.as_str() {
        "heartbeat" => OutputShape::Display,
        _ => OutputShape::Ratio,
    };

    let batch_query = BatchQuery {
        granularity: query.granularity.clone(),
        window: WindowParams {
            date: query.date.clone(),
            start_date: query.start_date.clone(),
            end_date: query.end_date.clone(),
            days: query.days,
        },
        max_points: query.max_points,
        shape,
        monitor_ids: parse_monitor_ids(&query.monitor_ids),
    };

    match batch::run(&state.store, &state.registry, &batch_query, Utc::now()) {
        Ok(response) => Json(response).into_response(),
        Err(e) if e.is_validation() => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardQuery {
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default)]
    pub days: Option<f64>,
    /// Minutes between data points, for the custom preset.
    #[serde(default)]
    pub interval: Option<u32>,
    #[serde(default)]
    pub monitor_ids: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

pub async fn handle_dashboard_status(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> impl IntoResponse {
    let params = match preset::resolve(&query.preset, query.days, query.interval) {
        Ok(p) => p,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let batch_query = BatchQuery {
        granularity: params.granularity.to_string(),
        window: WindowParams {
            date: query.date.clone(),
            start_date: query.start_date.clone(),
            end_date: query.end_date.clone(),
            days: params.days,
        },
        max_points: params.max_points,
        shape: OutputShape::Ratio,
        monitor_ids: parse_monitor_ids(&query.monitor_ids),
    };

    match batch::run(&state.store, &state.registry, &batch_query, Utc::now()) {
        Ok(response) => Json(json!({
            "preset": query.preset.to_ascii_lowercase(),
            "monitors": response.monitors,
            "config": response.config,
        }))
        .into_response(),
        Err(e) if e.is_validation() => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ============================================================================
// API: Heartbeat ingestion
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PushQuery {
    #[serde(default = "default_push_status")]
    pub status: String,
    #[serde(default)]
    pub ping: Option<f64>,
    #[serde(default = "default_push_msg")]
    pub msg: String,
}

pub async fn handle_push(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<PushQuery>,
) -> impl IntoResponse {
    let monitor = match state.store.get_monitor_by_token(&token) {
        Ok(m) => m,
        Err(DbError::NotFound) => {
            return error_response(
                StatusCode::NOT_FOUND,
                "Monitor not found or not active.".to_string(),
            )
        }
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let raw = if query.status == "up" {
        Status::Up
    } else {
        Status::Down
    };

    match state
        .ingestor
        .process_beat(&monitor, raw, query.ping, &query.msg, Utc::now())
    {
        Ok(outcome) => {
            if outcome.notable || outcome.resend_due {
                // Notification dispatch is external; surface the flag
                tracing::info!(
                    "notable beat for {}: {:?} (resend_due={})",
                    monitor.name,
                    outcome.heartbeat.status,
                    outcome.resend_due
                );
            }
            Json(json!({ "ok": true })).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ============================================================================
// API: Monitors
// ============================================================================

pub async fn handle_get_monitors(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.get_monitors() {
        Ok(monitors) => Json(monitors).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMonitorRequest {
    pub name: String,
    #[serde(default)]
    pub url: String,
    pub push_token: String,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub resend_interval: u32,
    #[serde(default)]
    pub inverted: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMonitorRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub resend_interval: Option<u32>,
    #[serde(default)]
    pub inverted: Option<bool>,
}

pub async fn handle_create_monitor(
    State(state): State<AppState>,
    Json(req): Json<CreateMonitorRequest>,
) -> impl IntoResponse {
    if req.name.is_empty() || req.push_token.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "name and push_token are required".to_string(),
        );
    }

    let mut monitor = Monitor {
        id: 0,
        name: req.name,
        url: req.url,
        push_token: req.push_token,
        active: true,
        max_retries: req.max_retries,
        resend_interval: req.resend_interval,
        inverted: req.inverted,
    };

    match state.store.add_monitor(&mut monitor) {
        Ok(_) => Json(monitor).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn handle_update_monitor(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateMonitorRequest>,
) -> impl IntoResponse {
    let mut monitor = match state.store.get_monitor(id) {
        Ok(m) => m,
        Err(DbError::NotFound) => {
            return error_response(StatusCode::NOT_FOUND, "Monitor not found".to_string())
        }
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    if let Some(name) = req.name {
        monitor.name = name;
    }
    if let Some(url) = req.url {
        monitor.url = url;
    }
    if let Some(active) = req.active {
        monitor.active = active;
    }
    if let Some(max_retries) = req.max_retries {
        monitor.max_retries = max_retries;
    }
    if let Some(resend_interval) = req.resend_interval {
        monitor.resend_interval = resend_interval;
    }
    if let Some(inverted) = req.inverted {
        monitor.inverted = inverted;
    }

    match state.store.update_monitor(&monitor) {
        Ok(()) => Json(monitor).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn handle_delete_monitor(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    state.registry.remove(id);

    match state.store.delete_monitor(id) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
