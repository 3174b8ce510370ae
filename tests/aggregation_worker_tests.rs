// Aggregator tests: aggregate_bucket end-to-end against SQLite

mod common;

use common::{event, success_events};
use mcp_metrics::aggregation_worker::aggregate_bucket;
use mcp_metrics::bucket::Resolution;
use mcp_metrics::metrics_repo::MetricsRepo;
use mcp_metrics::models::{CallStatus, Dimension};
use tempfile::TempDir;

const BUCKET_START: i64 = 1_500_000_000_000; // aligned for 5-minute buckets

async fn test_repo(dir: &TempDir) -> MetricsRepo {
    let path = dir.path().join("metrics.db");
    let repo = MetricsRepo::connect(path.to_str().unwrap(), 2)
        .await
        .unwrap();
    repo.init().await.unwrap();
    repo
}

#[tokio::test]
async fn aggregate_bucket_writes_tool_and_overall_rows() {
    let dir = TempDir::new().unwrap();
    let repo = test_repo(&dir).await;

    repo.append_events(&success_events("search", BUCKET_START, 10))
        .await
        .unwrap();

    let written = aggregate_bucket(&repo, Resolution::FiveMinute, BUCKET_START)
        .await
        .unwrap();
    assert_eq!(written, 2);

    let rows = repo
        .rollups_by_time_range(Resolution::FiveMinute, BUCKET_START, BUCKET_START + 1, None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);

    let tool = rows
        .iter()
        .find(|r| r.dimension == Dimension::Tool("search".into()))
        .unwrap();
    assert_eq!(tool.total_count, 10);
    assert_eq!(tool.success_count, 10);
    assert_eq!(tool.error_count, 0);
    assert_eq!(tool.avg_duration_ms, 55.0);
    assert_eq!(tool.min_duration_ms, 10.0);
    assert_eq!(tool.max_duration_ms, 100.0);
    assert_eq!(tool.p95_duration_ms, 100.0);

    let overall = rows
        .iter()
        .find(|r| r.dimension == Dimension::Overall)
        .unwrap();
    assert_eq!(overall.total_count, 10);
    assert_eq!(overall.p95_duration_ms, 100.0);
}

#[tokio::test]
async fn aggregate_bucket_with_no_events_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let repo = test_repo(&dir).await;

    let written = aggregate_bucket(&repo, Resolution::FiveMinute, BUCKET_START)
        .await
        .unwrap();
    assert_eq!(written, 0);

    let rows = repo
        .rollups_by_time_range(
            Resolution::FiveMinute,
            BUCKET_START,
            BUCKET_START + 300_000,
            None,
        )
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn aggregate_bucket_excludes_events_outside_window() {
    let dir = TempDir::new().unwrap();
    let repo = test_repo(&dir).await;

    let bucket_end = BUCKET_START + 300_000;
    repo.append_events(&[
        event(BUCKET_START - 1, Some("search"), Some(1), CallStatus::Success),
        event(BUCKET_START, Some("search"), Some(2), CallStatus::Success),
        event(bucket_end - 1, Some("search"), Some(3), CallStatus::Success),
        event(bucket_end, Some("search"), Some(4), CallStatus::Success),
    ])
    .await
    .unwrap();

    aggregate_bucket(&repo, Resolution::FiveMinute, BUCKET_START)
        .await
        .unwrap();

    let rows = repo
        .rollups_by_time_range(
            Resolution::FiveMinute,
            BUCKET_START,
            BUCKET_START + 1,
            Some(&Dimension::Overall),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    // Only the two events in [start, end) count.
    assert_eq!(rows[0].total_count, 2);
    assert_eq!(rows[0].min_duration_ms, 2.0);
    assert_eq!(rows[0].max_duration_ms, 3.0);
}

#[tokio::test]
async fn aggregate_bucket_rerun_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let repo = test_repo(&dir).await;

    let mut events = success_events("search", BUCKET_START, 6);
    events.extend(success_events("list", BUCKET_START + 50, 4));
    repo.append_events(&events).await.unwrap();

    aggregate_bucket(&repo, Resolution::FiveMinute, BUCKET_START)
        .await
        .unwrap();
    let first = repo
        .rollups_by_time_range(Resolution::FiveMinute, BUCKET_START, BUCKET_START + 1, None)
        .await
        .unwrap();

    aggregate_bucket(&repo, Resolution::FiveMinute, BUCKET_START)
        .await
        .unwrap();
    let second = repo
        .rollups_by_time_range(Resolution::FiveMinute, BUCKET_START, BUCKET_START + 1, None)
        .await
        .unwrap();

    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
}

#[tokio::test]
async fn aggregate_bucket_recomputes_after_events_change() {
    let dir = TempDir::new().unwrap();
    let repo = test_repo(&dir).await;

    repo.append_events(&success_events("search", BUCKET_START, 5))
        .await
        .unwrap();
    aggregate_bucket(&repo, Resolution::FiveMinute, BUCKET_START)
        .await
        .unwrap();

    repo.append_events(&[event(
        BUCKET_START + 200,
        Some("search"),
        Some(1_000),
        CallStatus::Error,
    )])
    .await
    .unwrap();
    aggregate_bucket(&repo, Resolution::FiveMinute, BUCKET_START)
        .await
        .unwrap();

    let rows = repo
        .rollups_by_time_range(
            Resolution::FiveMinute,
            BUCKET_START,
            BUCKET_START + 1,
            Some(&Dimension::Tool("search".into())),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].total_count, 6);
    assert_eq!(rows[0].error_count, 1);
    assert_eq!(rows[0].max_duration_ms, 1_000.0);
}

#[tokio::test]
async fn aggregate_bucket_per_resolution_keys_do_not_collide() {
    let dir = TempDir::new().unwrap();
    let repo = test_repo(&dir).await;

    // One hour-aligned window covering the 5-minute bucket.
    let hour_start = Resolution::OneHour.aligned_start_ms(BUCKET_START);
    repo.append_events(&success_events("search", BUCKET_START, 3))
        .await
        .unwrap();

    aggregate_bucket(&repo, Resolution::FiveMinute, BUCKET_START)
        .await
        .unwrap();
    aggregate_bucket(&repo, Resolution::OneHour, hour_start)
        .await
        .unwrap();

    let five_min = repo
        .rollups_by_time_range(Resolution::FiveMinute, BUCKET_START, BUCKET_START + 1, None)
        .await
        .unwrap();
    let hourly = repo
        .rollups_by_time_range(Resolution::OneHour, hour_start, hour_start + 1, None)
        .await
        .unwrap();
    assert_eq!(five_min.len(), 2);
    assert_eq!(hourly.len(), 2);
    assert!(five_min.iter().all(|r| r.resolution == Resolution::FiveMinute));
    assert!(hourly.iter().all(|r| r.resolution == Resolution::OneHour));
}
