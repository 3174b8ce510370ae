// One-time backfill: aggregate the most recently closed bucket of every
// resolution at startup, so a restart that straddled a boundary does not
// leave a hole until the next scheduled tick.

use std::sync::Arc;

use tracing::info;

use crate::aggregation_worker::aggregate_bucket;
use crate::bucket::Resolution;
use crate::metrics_repo::MetricsRepo;

pub async fn run_backfill(repo: Arc<MetricsRepo>) -> anyhow::Result<()> {
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_millis() as i64;

    for resolution in Resolution::ALL {
        let bucket = resolution.last_closed_bucket(now_ms);
        aggregate_bucket(repo.as_ref(), resolution, bucket.start_ms).await?;
    }
    info!("backfill complete");
    Ok(())
}
