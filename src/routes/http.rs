// Handlers: version, event ingestion, rollup queries

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use super::AppState;
use crate::bucket::Resolution;
use crate::models::{CallEvent, CallStatus, Dimension, MetricsRollup};

/// Package version (from Cargo.toml).
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name (from Cargo.toml).
const NAME: &str = env!("CARGO_PKG_NAME");

/// GET /version — returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// Ingestion body: a tool-call event. `timestampMs` may be omitted, in
/// which case the event is stamped at ingestion time.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct EventBody {
    timestamp_ms: Option<i64>,
    tool_name: Option<String>,
    duration_ms: Option<i64>,
    status: CallStatus,
}

/// POST /api/events — append one raw event.
pub(super) async fn append_event_handler(
    State(state): State<AppState>,
    Json(body): Json<EventBody>,
) -> Result<StatusCode, (StatusCode, String)> {
    if let Some(d) = body.duration_ms
        && d < 0
    {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("durationMs must be >= 0, got {}", d),
        ));
    }
    if let Some(ref name) = body.tool_name
        && name.is_empty()
    {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "toolName must be non-empty when present".to_string(),
        ));
    }

    let timestamp_ms = match body.timestamp_ms {
        Some(ts) if ts >= 0 => ts,
        Some(ts) => {
            return Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("timestampMs must be >= 0, got {}", ts),
            ));
        }
        None => std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .map_err(|e| internal_error(e.into()))?,
    };

    let event = CallEvent {
        timestamp_ms,
        tool_name: body.tool_name,
        duration_ms: body.duration_ms,
        status: body.status,
    };
    state
        .repo
        .append_events(std::slice::from_ref(&event))
        .await
        .map_err(internal_error)?;
    Ok(StatusCode::ACCEPTED)
}

/// Query for GET /api/rollups. `tool` narrows to one dimension; the empty
/// string selects the overall rows.
#[derive(Debug, Deserialize)]
pub(super) struct RollupQuery {
    resolution: String,
    from: i64,
    to: i64,
    tool: Option<String>,
}

/// GET /api/rollups — rollup rows for [from, to), ascending by bucket start.
pub(super) async fn get_rollups_handler(
    State(state): State<AppState>,
    Query(query): Query<RollupQuery>,
) -> Result<Json<Vec<MetricsRollup>>, (StatusCode, String)> {
    let resolution: Resolution = query
        .resolution
        .parse()
        .map_err(|e: crate::bucket::ParseResolutionError| {
            (StatusCode::BAD_REQUEST, e.to_string())
        })?;
    let dimension = query.tool.map(|t| {
        if t.is_empty() {
            Dimension::Overall
        } else {
            Dimension::Tool(t)
        }
    });

    let rollups = state
        .repo
        .rollups_by_time_range(resolution, query.from, query.to, dimension.as_ref())
        .await
        .map_err(internal_error)?;
    Ok(Json(rollups))
}

fn internal_error(e: anyhow::Error) -> (StatusCode, String) {
    tracing::error!(error = %e, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
}
