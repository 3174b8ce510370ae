use std::sync::Arc;

use anyhow::Result;
use mcp_metrics::*;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let repo = Arc::new(
        metrics_repo::MetricsRepo::connect(
            &app_config.database.path,
            app_config.database.max_pool_size,
        )
        .await?,
    );
    repo.init().await?;

    if app_config.aggregation.enabled {
        if let Err(e) = backfill::run_backfill(repo.clone()).await {
            tracing::warn!(error = %e, "startup backfill failed; scheduler will catch up");
        }
    }

    let mut worker_handles = aggregation_worker::spawn(
        repo.clone(),
        aggregation_worker::AggregationWorkerConfig {
            enabled: app_config.aggregation.enabled,
            run_timeout_secs: app_config.aggregation.run_timeout_secs,
        },
    );
    worker_handles.push(cleanup_worker::spawn(
        repo.clone(),
        cleanup_worker::CleanupWorkerConfig {
            raw_retention_hours: app_config.retention.raw_retention_hours,
            hourly_retention_days: app_config.retention.hourly_retention_days,
            daily_retention_days: app_config.retention.daily_retention_days,
            cleanup_interval_hours: app_config.retention.cleanup_interval_hours,
            vacuum_schedule: app_config.retention.vacuum_schedule.clone(),
            vacuum_interval_secs: app_config.retention.vacuum_interval_secs,
        },
    ));

    let app = routes::app(repo);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let in_container = std::path::Path::new("/.dockerenv").exists()
        || std::env::var("CONTAINER").as_deref() == Ok("1");

    if in_container {
        // In Docker: run server until error or SIGTERM (no signal handler; avoids immediate exit)
        axum::serve(listener, app).await?;
    } else {
        tokio::select! {
            result = axum::serve(listener, app) => {
                result?;
            }
            _ = async {
                #[cfg(unix)]
                {
                    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                        Ok(s) => s,
                        Err(_) => {
                            let _ = tokio::signal::ctrl_c().await;
                            return;
                        }
                    };
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                #[cfg(not(unix))]
                {
                    tokio::signal::ctrl_c().await
                }
            } => {
                tracing::info!("Received shutdown signal");
                for handle in &worker_handles {
                    handle.abort();
                }
            }
        }
    }

    Ok(())
}
