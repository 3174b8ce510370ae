// Rollup row: one row per (resolution, bucket, dimension).
// Duration stats are 0.0 when no event in the group carried a duration.

use serde::{Deserialize, Serialize};

use crate::bucket::Resolution;

/// Grouping key of a rollup row: a named tool, or the synthetic overall
/// group merging every event in the bucket. An explicit variant instead of
/// a nullable name, so "no tool" cannot be read as a tool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dimension {
    Overall,
    Tool(String),
}

impl Dimension {
    /// Storage encoding: the empty string marks the overall row.
    /// Tool names are validated non-empty at ingestion.
    pub fn as_column(&self) -> &str {
        match self {
            Dimension::Overall => "",
            Dimension::Tool(name) => name,
        }
    }

    pub fn from_column(s: &str) -> Dimension {
        if s.is_empty() {
            Dimension::Overall
        } else {
            Dimension::Tool(s.to_string())
        }
    }
}

/// One aggregate row, uniquely keyed by (resolution, bucket_start_ms, dimension).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsRollup {
    pub resolution: Resolution,
    pub bucket_start_ms: i64,
    pub bucket_end_ms: i64,
    pub dimension: Dimension,
    pub total_count: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub avg_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub p95_duration_ms: f64,
}
