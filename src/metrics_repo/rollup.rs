// Rollup pass: schema for the rollup table + pure aggregation logic.
// DB access (query by range, upsert, prune) stays in metrics_repo::mod.

use std::collections::BTreeMap;

use sqlx::SqlitePool;

use crate::bucket::Resolution;
use crate::models::{CallEvent, CallStatus, Dimension, MetricsRollup};
use crate::stats;

/// Creates the metrics_rollup table and its unique key if not present.
/// tool_name is NOT NULL; the empty string encodes the overall row.
pub async fn init_rollup_table(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metrics_rollup (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            resolution_secs INTEGER NOT NULL,
            bucket_start INTEGER NOT NULL,
            bucket_end INTEGER NOT NULL,
            tool_name TEXT NOT NULL DEFAULT '',
            total_count INTEGER NOT NULL,
            success_count INTEGER NOT NULL,
            error_count INTEGER NOT NULL,
            avg_duration_ms REAL NOT NULL,
            min_duration_ms REAL NOT NULL,
            max_duration_ms REAL NOT NULL,
            p95_duration_ms REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_rollup_key ON metrics_rollup(resolution_secs, bucket_start, tool_name)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Rolls one bucket of raw events into rollup rows: one per named tool
/// (sorted by name) plus one overall row merging every event. Events with
/// no tool name count toward the overall row only. Empty input produces
/// no rows.
pub fn rollup_events(
    events: &[CallEvent],
    resolution: Resolution,
    bucket_start_ms: i64,
) -> Vec<MetricsRollup> {
    if events.is_empty() {
        return Vec::new();
    }
    let bucket_end_ms = bucket_start_ms + resolution.duration_ms();

    let mut by_tool: BTreeMap<&str, Vec<&CallEvent>> = BTreeMap::new();
    for e in events {
        if let Some(name) = e.tool_name.as_deref() {
            by_tool.entry(name).or_default().push(e);
        }
    }

    let mut out: Vec<MetricsRollup> = Vec::with_capacity(by_tool.len() + 1);
    for (name, group) in &by_tool {
        out.push(rollup_group(
            group,
            Dimension::Tool(name.to_string()),
            resolution,
            bucket_start_ms,
            bucket_end_ms,
        ));
    }

    let all: Vec<&CallEvent> = events.iter().collect();
    out.push(rollup_group(
        &all,
        Dimension::Overall,
        resolution,
        bucket_start_ms,
        bucket_end_ms,
    ));
    out
}

fn rollup_group(
    events: &[&CallEvent],
    dimension: Dimension,
    resolution: Resolution,
    bucket_start_ms: i64,
    bucket_end_ms: i64,
) -> MetricsRollup {
    let total_count = events.len() as i64;
    let success_count = events
        .iter()
        .filter(|e| e.status == CallStatus::Success)
        .count() as i64;
    let error_count = total_count - success_count;

    let mut durations: Vec<i64> = events.iter().filter_map(|e| e.duration_ms).collect();
    durations.sort_unstable();

    let (avg, min, max, p95) = if durations.is_empty() {
        (0.0, 0.0, 0.0, 0.0)
    } else {
        (
            stats::mean(&durations),
            durations[0] as f64,
            durations[durations.len() - 1] as f64,
            stats::percentile(&durations, 95) as f64,
        )
    };

    MetricsRollup {
        resolution,
        bucket_start_ms,
        bucket_end_ms,
        dimension,
        total_count,
        success_count,
        error_count,
        avg_duration_ms: avg,
        min_duration_ms: min,
        max_duration_ms: max,
        p95_duration_ms: p95,
    }
}
