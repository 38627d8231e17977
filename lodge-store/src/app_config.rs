use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub booking: BookingRules,
    #[serde(default)]
    pub reaper: ReaperConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BookingRules {
    /// Hold window for a Pending booking's room locks.
    #[serde(default = "default_hold_seconds")]
    pub hold_seconds: u64,
    /// Upper bound for one create/transition transaction.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    /// Require client nightly prices to match the room catalog.
    #[serde(default)]
    pub verify_catalog_prices: bool,
}

fn default_hold_seconds() -> u64 {
    900
}

fn default_operation_timeout_ms() -> u64 {
    5_000
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            hold_seconds: default_hold_seconds(),
            operation_timeout_ms: default_operation_timeout_ms(),
            verify_catalog_prices: false,
        }
    }
}

impl BookingRules {
    pub fn hold_window(&self) -> Duration {
        Duration::from_secs(self.hold_seconds)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ReaperConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_reaper_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_reaper_batch")]
    pub batch_size: u64,
}

fn default_reaper_interval() -> u64 {
    60
}

fn default_reaper_batch() -> u64 {
    100
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: default_reaper_interval(),
            batch_size: default_reaper_batch(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

fn default_max_connections() -> u32 {
    20
}

fn default_acquire_timeout() -> u64 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

fn default_rate_limit() -> i64 {
    100
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Untracked local overrides
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `LODGE_DATABASE__URL=postgres://...` sets `database.url`
            .add_source(config::Environment::with_prefix("LODGE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
