//! Session control endpoints: start, stop, status, logs.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use hd_domain::recipient::{split_list, TargetMode};
use hd_domain::{session_key, Error};
use hd_sessions::SessionConfig;

use crate::api::ApiError;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/sessions/start
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A list given either as one comma-separated string or as an array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListInput {
    Csv(String),
    Items(Vec<String>),
}

impl Default for ListInput {
    fn default() -> Self {
        Self::Items(Vec::new())
    }
}

impl ListInput {
    pub fn items(&self) -> Vec<String> {
        match self {
            Self::Csv(raw) => split_list(raw),
            Self::Items(items) => items
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StartSessionBody {
    /// Session key. Blank or missing means `"session"`.
    #[serde(default)]
    pub key: Option<String>,
    /// `users` / `groups` (or `1` / `2`). Defaults to users.
    #[serde(default)]
    pub target_mode: Option<String>,
    #[serde(default)]
    pub targets: ListInput,
    /// Message templates, rotated one per cycle.
    #[serde(default)]
    pub messages: ListInput,
    #[serde(default)]
    pub prefix: Option<String>,
    /// Seconds between cycles, as a number or numeric string.
    #[serde(default)]
    pub interval_secs: Option<serde_json::Value>,
}

/// Parse the requested interval; missing, non-numeric or zero values fall
/// back to `default`.
fn parse_interval(raw: Option<&serde_json::Value>, default: u64) -> u64 {
    let parsed = match raw {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed.filter(|&n| n > 0).unwrap_or(default)
}

pub async fn start_session(
    State(state): State<AppState>,
    Json(body): Json<StartSessionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let key = session_key::resolve(body.key.as_deref())?;

    let mode = match body.target_mode.as_deref() {
        None => TargetMode::Users,
        Some(raw) => TargetMode::parse(raw).ok_or_else(|| {
            Error::ConfigInvalid(format!("unknown target_mode {raw:?}, expected users or groups"))
        })?,
    };

    let normalizer = &state.registry.context().normalizer;
    let config = SessionConfig {
        targets: normalizer.normalize_all(mode, &body.targets.items()),
        templates: body.messages.items(),
        prefix: body.prefix.as_deref().unwrap_or_default().trim().to_owned(),
        interval_secs: parse_interval(
            body.interval_secs.as_ref(),
            state.config.broadcast.default_interval_secs,
        ),
    };

    let handle = state.registry.start(&key, config)?;
    tracing::info!(
        session_key = %key,
        session_id = %handle.id,
        targets = handle.config.targets.len(),
        interval_secs = handle.config.interval_secs,
        "session start accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "key": key,
            "session_id": handle.id,
            "targets": handle.config.targets.len(),
            "templates": handle.config.templates.len(),
            "interval_secs": handle.config.interval_secs,
            "status": "starting",
        })),
    ))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn stop_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.registry.stop(&key)?;
    Ok(Json(json!({ "key": key, "stopped": true })))
}

pub async fn stop_all_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let stopped = state.registry.stop_all();
    Json(json!({ "stopped": stopped }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Introspection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.registry.list();
    Json(json!({ "count": sessions.len(), "sessions": sessions }))
}

/// Absent sessions answer 200 with `connected: false`.
pub async fn session_status(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    Json(state.registry.status(&key))
}

pub async fn session_logs(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    let logs = state.registry.logs().read(&key);
    Json(json!({ "key": key, "logs": logs }))
}
