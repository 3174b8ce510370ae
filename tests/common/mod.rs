// Shared test helpers

#![allow(dead_code)]

use mcp_metrics::models::{CallEvent, CallStatus};

pub fn event(
    timestamp_ms: i64,
    tool: Option<&str>,
    duration_ms: Option<i64>,
    status: CallStatus,
) -> CallEvent {
    CallEvent {
        timestamp_ms,
        tool_name: tool.map(str::to_string),
        duration_ms,
        status,
    }
}

/// n success events for one tool with durations 10, 20, .. n*10, spread
/// one ms apart from start_ms.
pub fn success_events(tool: &str, start_ms: i64, n: i64) -> Vec<CallEvent> {
    (0..n)
        .map(|i| {
            event(
                start_ms + i,
                Some(tool),
                Some((i + 1) * 10),
                CallStatus::Success,
            )
        })
        .collect()
}
