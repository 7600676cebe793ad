use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use merx_shared::events::{ClientLogEvent, TelemetryEvent};
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LogEntryRequest {
    pub level: String,
    pub message: String,
    pub source: Option<String>,
    pub url: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: Option<i64>,
}

/// POST /api/logs
/// Client telemetry intake. Best-effort by contract: the entry goes into
/// the bounded queue and this endpoint never fails the caller.
pub async fn ingest_client_log(
    State(state): State<AppState>,
    Json(entry): Json<LogEntryRequest>,
) -> StatusCode {
    state.telemetry.emit(TelemetryEvent::ClientLog(ClientLogEvent {
        level: entry.level,
        message: entry.message,
        source: entry.source,
        url: entry.url,
        user_agent: entry.user_agent,
        timestamp: entry.timestamp.unwrap_or_else(|| Utc::now().timestamp_millis()),
    }));

    StatusCode::ACCEPTED
}
