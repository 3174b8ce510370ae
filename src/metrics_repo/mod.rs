// SQLite persistence for raw call events and rollup rows.
// call_events is append-only from ingestion; metrics_rollup is keyed
// upserts from the aggregation worker.

pub mod rollup;

use std::path::Path;
use std::str::FromStr;

use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::instrument;

use crate::bucket::Resolution;
use crate::models::{CallEvent, CallStatus, Dimension, MetricsRollup};

pub struct MetricsRepo {
    pool: SqlitePool,
}

impl MetricsRepo {
    pub async fn connect(path: &str, max_pool_size: u32) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_lazy_with(opts);
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS call_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at INTEGER NOT NULL,
                tool_name TEXT,
                duration_ms INTEGER,
                status TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_created_at ON call_events(created_at)",
        )
        .execute(&self.pool)
        .await?;

        rollup::init_rollup_table(&self.pool).await?;

        Ok(())
    }

    #[instrument(skip(self, events), fields(repo = "metrics", operation = "append_events", events_count = events.len()))]
    pub async fn append_events(&self, events: &[CallEvent]) -> anyhow::Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for e in events {
            sqlx::query(
                "INSERT INTO call_events (created_at, tool_name, duration_ms, status) VALUES ($1, $2, $3, $4)",
            )
            .bind(e.timestamp_ms)
            .bind(e.tool_name.as_deref())
            .bind(e.duration_ms)
            .bind(e.status.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Raw events in [from_ms, to_ms). No ordering contract; the rollup
    /// pass sorts durations itself.
    #[instrument(
        skip(self),
        fields(repo = "metrics", operation = "events_by_time_range")
    )]
    pub async fn events_by_time_range(
        &self,
        from_ms: i64,
        to_ms: i64,
    ) -> anyhow::Result<Vec<CallEvent>> {
        let rows = sqlx::query(
            "SELECT created_at, tool_name, duration_ms, status
             FROM call_events WHERE created_at >= $1 AND created_at < $2",
        )
        .bind(from_ms)
        .bind(to_ms)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Self::parse_event_row(&row)?);
        }
        Ok(out)
    }

    /// Insert-or-replace keyed by (resolution_secs, bucket_start, tool_name).
    #[instrument(skip(self, r), fields(repo = "metrics", operation = "upsert_rollup"))]
    pub async fn upsert_rollup(&self, r: &MetricsRollup) -> anyhow::Result<()> {
        bind_rollup(sqlx::query(UPSERT_ROLLUP_SQL), r)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Replaces the whole row set of one (resolution, bucket_start) in a
    /// single transaction: rows for dimensions no longer present are
    /// deleted, the rest are upserted. A mid-run failure rolls back, so a
    /// bucket never holds a mix of old and new rows.
    #[instrument(
        skip(self, rows),
        fields(repo = "metrics", operation = "replace_bucket_rollups", rows_count = rows.len())
    )]
    pub async fn replace_bucket_rollups(
        &self,
        resolution: Resolution,
        bucket_start_ms: i64,
        rows: &[MetricsRollup],
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM metrics_rollup WHERE resolution_secs = $1 AND bucket_start = $2")
            .bind(resolution.secs())
            .bind(bucket_start_ms)
            .execute(&mut *tx)
            .await?;
        for r in rows {
            bind_rollup(sqlx::query(UPSERT_ROLLUP_SQL), r)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Rollup rows with bucket_start in [from_ms, to_ms) for one resolution,
    /// ascending by bucket_start. `dimension` narrows to one row per bucket.
    #[instrument(
        skip(self, dimension),
        fields(repo = "metrics", operation = "rollups_by_time_range")
    )]
    pub async fn rollups_by_time_range(
        &self,
        resolution: Resolution,
        from_ms: i64,
        to_ms: i64,
        dimension: Option<&Dimension>,
    ) -> anyhow::Result<Vec<MetricsRollup>> {
        let rows = match dimension {
            Some(d) => {
                sqlx::query(
                    "SELECT resolution_secs, bucket_start, bucket_end, tool_name,
                            total_count, success_count, error_count,
                            avg_duration_ms, min_duration_ms, max_duration_ms, p95_duration_ms
                     FROM metrics_rollup
                     WHERE resolution_secs = $1 AND bucket_start >= $2 AND bucket_start < $3 AND tool_name = $4
                     ORDER BY bucket_start ASC",
                )
                .bind(resolution.secs())
                .bind(from_ms)
                .bind(to_ms)
                .bind(d.as_column())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT resolution_secs, bucket_start, bucket_end, tool_name,
                            total_count, success_count, error_count,
                            avg_duration_ms, min_duration_ms, max_duration_ms, p95_duration_ms
                     FROM metrics_rollup
                     WHERE resolution_secs = $1 AND bucket_start >= $2 AND bucket_start < $3
                     ORDER BY bucket_start ASC, tool_name ASC",
                )
                .bind(resolution.secs())
                .bind(from_ms)
                .bind(to_ms)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Self::parse_rollup_row(&row)?);
        }
        Ok(out)
    }

    /// Delete raw events older than cutoff_ms. Returns rows deleted.
    #[instrument(skip(self), fields(repo = "metrics", operation = "prune_events_before"))]
    pub async fn prune_events_before(&self, cutoff_ms: i64) -> anyhow::Result<u64> {
        let r = sqlx::query("DELETE FROM call_events WHERE created_at < $1")
            .bind(cutoff_ms)
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected())
    }

    /// Delete rollup rows of one resolution with bucket_start older than
    /// cutoff_ms. Returns rows deleted.
    #[instrument(
        skip(self),
        fields(repo = "metrics", operation = "prune_rollups_before")
    )]
    pub async fn prune_rollups_before(
        &self,
        resolution: Resolution,
        cutoff_ms: i64,
    ) -> anyhow::Result<u64> {
        let r =
            sqlx::query("DELETE FROM metrics_rollup WHERE resolution_secs = $1 AND bucket_start < $2")
                .bind(resolution.secs())
                .bind(cutoff_ms)
                .execute(&self.pool)
                .await?;
        Ok(r.rows_affected())
    }

    /// Reclaim space after deletes (run periodically after pruning).
    #[instrument(skip(self), fields(repo = "metrics", operation = "vacuum"))]
    pub async fn vacuum(&self) -> anyhow::Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    fn parse_event_row(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<CallEvent> {
        let timestamp_ms: i64 = row.try_get("created_at")?;
        let tool_name: Option<String> = row.try_get("tool_name")?;
        let duration_ms: Option<i64> = row.try_get("duration_ms")?;
        let status: String = row.try_get("status")?;
        Ok(CallEvent {
            timestamp_ms,
            tool_name,
            duration_ms,
            status: CallStatus::from_column(&status),
        })
    }

    fn parse_rollup_row(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<MetricsRollup> {
        let resolution_secs: i64 = row.try_get("resolution_secs")?;
        let resolution = Resolution::from_secs(resolution_secs)
            .ok_or_else(|| anyhow::anyhow!("unknown resolution_secs {} in rollup row", resolution_secs))?;
        let tool_name: String = row.try_get("tool_name")?;
        Ok(MetricsRollup {
            resolution,
            bucket_start_ms: row.try_get("bucket_start")?,
            bucket_end_ms: row.try_get("bucket_end")?,
            dimension: Dimension::from_column(&tool_name),
            total_count: row.try_get("total_count")?,
            success_count: row.try_get("success_count")?,
            error_count: row.try_get("error_count")?,
            avg_duration_ms: row.try_get("avg_duration_ms")?,
            min_duration_ms: row.try_get("min_duration_ms")?,
            max_duration_ms: row.try_get("max_duration_ms")?,
            p95_duration_ms: row.try_get("p95_duration_ms")?,
        })
    }
}

const UPSERT_ROLLUP_SQL: &str = r#"
    INSERT INTO metrics_rollup
    (resolution_secs, bucket_start, bucket_end, tool_name,
     total_count, success_count, error_count,
     avg_duration_ms, min_duration_ms, max_duration_ms, p95_duration_ms)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    ON CONFLICT(resolution_secs, bucket_start, tool_name) DO UPDATE SET
        bucket_end = excluded.bucket_end,
        total_count = excluded.total_count,
        success_count = excluded.success_count,
        error_count = excluded.error_count,
        avg_duration_ms = excluded.avg_duration_ms,
        min_duration_ms = excluded.min_duration_ms,
        max_duration_ms = excluded.max_duration_ms,
        p95_duration_ms = excluded.p95_duration_ms
"#;

fn bind_rollup<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    r: &'q MetricsRollup,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(r.resolution.secs())
        .bind(r.bucket_start_ms)
        .bind(r.bucket_end_ms)
        .bind(r.dimension.as_column())
        .bind(r.total_count)
        .bind(r.success_count)
        .bind(r.error_count)
        .bind(r.avg_duration_ms)
        .bind(r.min_duration_ms)
        .bind(r.max_duration_ms)
        .bind(r.p95_duration_ms)
}
