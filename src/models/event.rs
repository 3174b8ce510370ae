// Raw telemetry: one row per completed tool call, written once at ingestion
// and read back only by the rollup pass.

use serde::{Deserialize, Serialize};

/// Outcome of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "ERROR")]
    Error,
}

impl CallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CallStatus::Success => "SUCCESS",
            CallStatus::Error => "ERROR",
        }
    }

    /// Parse a stored status column; anything unrecognized counts as Error.
    pub fn from_column(s: &str) -> CallStatus {
        if s.eq_ignore_ascii_case("SUCCESS") {
            CallStatus::Success
        } else {
            CallStatus::Error
        }
    }
}

/// One raw tool-call event. `tool_name: None` still counts toward the
/// overall rollup but never forms a dimension of its own; `duration_ms`
/// is absent when the caller could not time the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    pub timestamp_ms: i64,
    pub tool_name: Option<String>,
    pub duration_ms: Option<i64>,
    pub status: CallStatus,
}
