use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub docker: DockerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub rollup: RollupConfig,
    pub publishing: PublishingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DockerConfig {
    /// Unix socket path; the platform default when unset.
    pub socket: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// When false nothing is recorded and every query answers from a live sample.
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub path: String,
    pub max_pool_size: u32,
    /// Sampler ticks buffered before the history writer flushes.
    pub flush_rate: u64,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_flush_interval_secs() -> u64 {
    60
}

fn default_query_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplerConfig {
    #[serde(default = "default_sampler_interval_secs")]
    pub interval_secs: u64,
    /// How often to log app stats (ws_live clients, samples saved) at INFO level.
    #[serde(default = "default_stats_log_interval_secs")]
    pub stats_log_interval_secs: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sampler_interval_secs(),
            stats_log_interval_secs: default_stats_log_interval_secs(),
        }
    }
}

fn default_sampler_interval_secs() -> u64 {
    30
}

fn default_stats_log_interval_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct RollupConfig {
    #[serde(default = "default_rollup_interval_secs")]
    pub interval_secs: u64,
    /// Grace period after a bucket ends before it is rolled up.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    #[serde(default = "default_raw_retention_hours")]
    pub raw_retention_hours: u32,
    #[serde(default = "default_hourly_retention_days")]
    pub hourly_retention_days: u32,
    /// Daily rows are kept forever when unset.
    pub daily_retention_days: Option<u32>,
    /// Cron expression (with seconds field, local time) for VACUUM.
    pub vacuum_schedule: Option<String>,
    #[serde(default = "default_vacuum_interval_secs")]
    pub vacuum_interval_secs: u64,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_rollup_interval_secs(),
            settle_secs: default_settle_secs(),
            raw_retention_hours: default_raw_retention_hours(),
            hourly_retention_days: default_hourly_retention_days(),
            daily_retention_days: None,
            vacuum_schedule: None,
            vacuum_interval_secs: default_vacuum_interval_secs(),
        }
    }
}

fn default_rollup_interval_secs() -> u64 {
    3600
}

fn default_settle_secs() -> u64 {
    300
}

fn default_raw_retention_hours() -> u32 {
    168
}

fn default_hourly_retention_days() -> u32 {
    90
}

fn default_vacuum_interval_secs() -> u64 {
    86_400
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishingConfig {
    /// Max number of live snapshots kept in the broadcast channel for /ws/live (slow clients may lag).
    pub broadcast_capacity: usize,
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
        if let Some(socket) = &self.docker.socket {
            anyhow::ensure!(!socket.is_empty(), "docker.socket must be non-empty when set");
        }
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
            self.database.flush_rate > 0,
            "database.flush_rate must be > 0, got {}",
            self.database.flush_rate
        );
        anyhow::ensure!(
            self.database.flush_interval_secs > 0,
            "database.flush_interval_secs must be > 0, got {}",
            self.database.flush_interval_secs
        );
        anyhow::ensure!(
            self.database.query_timeout_ms > 0,
            "database.query_timeout_ms must be > 0, got {}",
            self.database.query_timeout_ms
        );
        anyhow::ensure!(
            self.sampler.interval_secs > 0,
            "sampler.interval_secs must be > 0, got {}",
            self.sampler.interval_secs
        );
        anyhow::ensure!(
            self.sampler.stats_log_interval_secs > 0,
            "sampler.stats_log_interval_secs must be > 0, got {}",
            self.sampler.stats_log_interval_secs
        );
        anyhow::ensure!(
            self.rollup.interval_secs > 0,
            "rollup.interval_secs must be > 0, got {}",
            self.rollup.interval_secs
        );
        if self.database.enabled {
            // Samples may sit in the writer buffer for a flush interval after their tick.
            let max_write_delay = self
                .database
                .flush_interval_secs
                .saturating_add(self.sampler.interval_secs);
            anyhow::ensure!(
                self.rollup.settle_secs > max_write_delay,
                "rollup.settle_secs must be > database.flush_interval_secs + sampler.interval_secs ({}), got {}",
                max_write_delay,
                self.rollup.settle_secs
            );
        }
        anyhow::ensure!(
            self.rollup.raw_retention_hours > 0,
            "rollup.raw_retention_hours must be > 0, got {}",
            self.rollup.raw_retention_hours
        );
        anyhow::ensure!(
            self.rollup.hourly_retention_days > 0,
            "rollup.hourly_retention_days must be > 0, got {}",
            self.rollup.hourly_retention_days
        );
        if let Some(days) = self.rollup.daily_retention_days {
            anyhow::ensure!(
                days > 0,
                "rollup.daily_retention_days must be > 0 when set, got {}",
                days
            );
        }
        if let Some(schedule) = &self.rollup.vacuum_schedule {
            anyhow::ensure!(
                schedule.parse::<cron::Schedule>().is_ok(),
                "rollup.vacuum_schedule is not a valid cron expression: {}",
                schedule
            );
        }
        anyhow::ensure!(
            self.rollup.vacuum_interval_secs > 0,
            "rollup.vacuum_interval_secs must be > 0, got {}",
            self.rollup.vacuum_interval_secs
        );
        anyhow::ensure!(
            self.publishing.broadcast_capacity > 0,
            "publishing.broadcast_capacity must be > 0, got {}",
            self.publishing.broadcast_capacity
        );
        Ok(())
    }
}
