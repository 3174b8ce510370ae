// Aggregation worker: one task per resolution. Each task sleeps to the
// next bucket boundary, then rolls the just-closed bucket of raw events
// into rollup rows. Runs within a resolution are sequential, so a slow run
// can never overlap the next tick; boundaries that pass while a run
// executes are skipped and logged.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::bucket::Resolution;
use crate::metrics_repo::{MetricsRepo, rollup};

/// Config for the aggregation worker.
#[derive(Debug, Clone)]
pub struct AggregationWorkerConfig {
    /// When false the scheduler never invokes a run (checked each tick).
    pub enabled: bool,
    /// A run exceeding this aborts and is retried on the next cycle.
    pub run_timeout_secs: u64,
}

/// Spawns one scheduler task per resolution. Returns the join handles.
pub fn spawn(
    repo: Arc<MetricsRepo>,
    config: AggregationWorkerConfig,
) -> Vec<tokio::task::JoinHandle<()>> {
    Resolution::ALL
        .iter()
        .map(|&resolution| {
            let repo = repo.clone();
            let config = config.clone();
            tokio::spawn(async move {
                run(repo, resolution, config).await;
            })
        })
        .collect()
}

#[instrument(skip(repo, config), fields(resolution = resolution.label()))]
async fn run(repo: Arc<MetricsRepo>, resolution: Resolution, config: AggregationWorkerConfig) {
    let duration_ms = resolution.duration_ms();
    // Bucket start of the last failed run, retried ahead of the current
    // bucket on the next cycle.
    let mut pending_retry: Option<i64> = None;
    let mut last_target: Option<i64> = None;

    loop {
        let Some(now_ms) = epoch_ms() else {
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        };
        let boundary_ms = resolution.aligned_start_ms(now_ms) + duration_ms;
        tokio::time::sleep(Duration::from_millis((boundary_ms - now_ms).max(0) as u64)).await;

        if !config.enabled {
            debug!("aggregation disabled; skipping run");
            continue;
        }

        let target_ms = boundary_ms - duration_ms;
        if let Some(prev) = last_target {
            let skipped = (target_ms - prev) / duration_ms - 1;
            if skipped > 0 {
                warn!(
                    skipped_buckets = skipped,
                    "scheduler fell behind; intermediate buckets were not aggregated"
                );
            }
        }
        last_target = Some(target_ms);

        if let Some(retry_ms) = pending_retry.take() {
            if retry_ms != target_ms
                && !run_once(&repo, resolution, retry_ms, config.run_timeout_secs).await
            {
                pending_retry = Some(retry_ms);
            }
        }
        if !run_once(&repo, resolution, target_ms, config.run_timeout_secs).await {
            pending_retry.get_or_insert(target_ms);
        }
    }
}

/// One scheduled run under the run timeout. Returns whether it succeeded.
async fn run_once(
    repo: &MetricsRepo,
    resolution: Resolution,
    bucket_start_ms: i64,
    run_timeout_secs: u64,
) -> bool {
    let timeout = Duration::from_secs(run_timeout_secs);
    match tokio::time::timeout(timeout, aggregate_bucket(repo, resolution, bucket_start_ms)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            warn!(bucket_start_ms, error = %e, "aggregation run failed; retrying next cycle");
            false
        }
        Err(_) => {
            warn!(
                bucket_start_ms,
                timeout_secs = run_timeout_secs,
                "aggregation run timed out; retrying next cycle"
            );
            false
        }
    }
}

/// Rolls one closed bucket: fetch raw events in [bucket_start, bucket_end),
/// group per tool plus overall, and replace the bucket's rollup rows in one
/// transaction. An empty window writes nothing and is not an error.
/// Re-running against an unchanged event set rewrites identical rows.
/// Returns the number of dimension rows written (including overall).
#[instrument(skip(repo), fields(resolution = resolution.label()))]
pub async fn aggregate_bucket(
    repo: &MetricsRepo,
    resolution: Resolution,
    bucket_start_ms: i64,
) -> anyhow::Result<usize> {
    let bucket_end_ms = bucket_start_ms + resolution.duration_ms();
    let events = repo.events_by_time_range(bucket_start_ms, bucket_end_ms).await?;
    if events.is_empty() {
        debug!(bucket_start_ms, "no events in bucket; nothing to aggregate");
        return Ok(0);
    }

    let rows = rollup::rollup_events(&events, resolution, bucket_start_ms);
    repo.replace_bucket_rollups(resolution, bucket_start_ms, &rows).await?;

    info!(
        bucket_start_ms,
        events_count = events.len(),
        rows_written = rows.len(),
        "bucket aggregated"
    );
    Ok(rows.len())
}

fn epoch_ms() -> Option<i64> {
    match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => Some(d.as_millis() as i64),
        Err(e) => {
            warn!(error = %e, "system time before epoch");
            None
        }
    }
}
