// Retention sweep: prune raw events and per-resolution rollup rows on a
// fixed interval. VACUUM runs on a configurable schedule (cron expression
// or fixed interval).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::bucket::Resolution;
use crate::metrics_repo::MetricsRepo;

const MS_PER_HOUR: i64 = 3_600_000;
const MS_PER_DAY: i64 = 86_400_000;

/// Config for the cleanup worker. Raw retention must outlive the longest
/// aggregation lag (config validation enforces >= two daily buckets), or a
/// delayed daily run would aggregate an already-purged window and
/// silently undercount.
#[derive(Debug, Clone)]
pub struct CleanupWorkerConfig {
    pub raw_retention_hours: u32,
    pub hourly_retention_days: u32,
    pub daily_retention_days: u32,
    pub cleanup_interval_hours: u32,
    /// Optional cron expression for VACUUM (e.g. "0 3 * * *" = 03:00 daily). Uses local time.
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    pub vacuum_interval_secs: u64,
}

/// Spawns the cleanup worker. Returns a join handle.
pub fn spawn(repo: Arc<MetricsRepo>, config: CleanupWorkerConfig) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(repo, config).await;
    })
}

#[instrument(skip(repo), fields(interval_hours = config.cleanup_interval_hours))]
async fn run(repo: Arc<MetricsRepo>, config: CleanupWorkerConfig) {
    let mut sweep_interval = tokio::time::interval(Duration::from_secs(
        config.cleanup_interval_hours as u64 * 3_600,
    ));
    sweep_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let (vacuum_tx, mut vacuum_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(vacuum_scheduler(config.clone(), vacuum_tx));

    loop {
        tokio::select! {
            _ = sweep_interval.tick() => {
                if let Err(e) = run_one_sweep(&repo, &config).await {
                    warn!(error = %e, "cleanup sweep failed");
                }
            }
            _ = vacuum_rx.recv() => {
                if let Err(e) = repo.vacuum().await {
                    warn!(error = %e, "vacuum failed");
                } else {
                    info!("vacuum complete");
                }
            }
        }
    }
}

/// Sends a message on `tx` at each VACUUM time (cron or fixed interval). Uses local time for cron.
async fn vacuum_scheduler(config: CleanupWorkerConfig, tx: tokio::sync::mpsc::Sender<()>) {
    if let Some(ref cron_str) = config.vacuum_schedule {
        let Ok(schedule) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid vacuum_schedule; VACUUM will not run");
            return;
        };
        loop {
            let now = chrono::Local::now();
            let next = schedule.after(&now).next();
            if let Some(next) = next {
                let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(delay).await;
                if tx.send(()).await.is_err() {
                    break;
                }
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    } else {
        let interval = Duration::from_secs(config.vacuum_interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            if tx.send(()).await.is_err() {
                break;
            }
        }
    }
}

/// Runs one retention sweep: raw events and 5-min rollups age out after
/// raw_retention_hours; hourly and daily rollups keep their own windows.
pub async fn run_one_sweep(
    repo: &MetricsRepo,
    config: &CleanupWorkerConfig,
) -> anyhow::Result<()> {
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_millis() as i64;

    let raw_cutoff = now_ms - (config.raw_retention_hours as i64) * MS_PER_HOUR;
    let hourly_cutoff = now_ms - (config.hourly_retention_days as i64) * MS_PER_DAY;
    let daily_cutoff = now_ms - (config.daily_retention_days as i64) * MS_PER_DAY;

    let events_deleted = repo.prune_events_before(raw_cutoff).await?;
    let five_min_deleted = repo
        .prune_rollups_before(Resolution::FiveMinute, raw_cutoff)
        .await?;
    let hourly_deleted = repo
        .prune_rollups_before(Resolution::OneHour, hourly_cutoff)
        .await?;
    let daily_deleted = repo
        .prune_rollups_before(Resolution::OneDay, daily_cutoff)
        .await?;

    info!(
        events_deleted,
        five_min_deleted, hourly_deleted, daily_deleted, "retention sweep complete"
    );
    Ok(())
}
