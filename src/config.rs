use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    /// When false, scheduled rollup runs are skipped entirely.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            run_timeout_secs: default_run_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// How long raw events (and 5-min rollups) stay queryable.
    #[serde(default = "default_raw_retention_hours")]
    pub raw_retention_hours: u32,
    #[serde(default = "default_hourly_retention_days")]
    pub hourly_retention_days: u32,
    #[serde(default = "default_daily_retention_days")]
    pub daily_retention_days: u32,
    #[serde(default = "default_cleanup_interval_hours")]
    pub cleanup_interval_hours: u32,
    /// Optional cron expression for VACUUM (e.g. "0 3 * * *" = 03:00 daily). Uses local time.
    #[serde(default)]
    pub vacuum_schedule: Option<String>,
    #[serde(default = "default_vacuum_interval_secs")]
    pub vacuum_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            raw_retention_hours: default_raw_retention_hours(),
            hourly_retention_days: default_hourly_retention_days(),
            daily_retention_days: default_daily_retention_days(),
            cleanup_interval_hours: default_cleanup_interval_hours(),
            vacuum_schedule: None,
            vacuum_interval_secs: default_vacuum_interval_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_run_timeout_secs() -> u64 {
    60
}

fn default_raw_retention_hours() -> u32 {
    48
}

fn default_hourly_retention_days() -> u32 {
    7
}

fn default_daily_retention_days() -> u32 {
    30
}

fn default_cleanup_interval_hours() -> u32 {
    6
}

fn default_vacuum_interval_secs() -> u64 {
    86_400
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            self.aggregation.run_timeout_secs > 0,
            "aggregation.run_timeout_secs must be > 0, got {}",
            self.aggregation.run_timeout_secs
        );
        // A daily rollup delayed by up to one full day still needs its raw
        // window intact, so raw retention must cover two daily buckets.
        anyhow::ensure!(
            self.retention.raw_retention_hours >= 48,
            "retention.raw_retention_hours must be >= 48, got {}",
            self.retention.raw_retention_hours
        );
        anyhow::ensure!(
            self.retention.hourly_retention_days > 0,
            "retention.hourly_retention_days must be > 0, got {}",
            self.retention.hourly_retention_days
        );
        anyhow::ensure!(
            self.retention.daily_retention_days > 0,
            "retention.daily_retention_days must be > 0, got {}",
            self.retention.daily_retention_days
        );
        anyhow::ensure!(
            self.retention.cleanup_interval_hours > 0,
            "retention.cleanup_interval_hours must be > 0, got {}",
            self.retention.cleanup_interval_hours
        );
        anyhow::ensure!(
            self.retention.vacuum_interval_secs > 0,
            "retention.vacuum_interval_secs must be > 0, got {}",
            self.retention.vacuum_interval_secs
        );
        Ok(())
    }
}
