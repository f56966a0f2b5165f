use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// JetStream stream holding device broker topics and inbound updates
    #[serde(default = "default_device_stream")]
    pub device_stream: String,

    /// Subject prefix for device broker topics (`{prefix}.{device_id}`)
    #[serde(default = "default_device_subject_prefix")]
    pub device_subject_prefix: String,

    /// Subject prefix for session room broadcasts (`{prefix}.{device_id}`)
    #[serde(default = "default_session_subject_prefix")]
    pub session_subject_prefix: String,

    /// Durable consumer name for inbound device updates
    #[serde(default = "default_update_consumer_name")]
    pub update_consumer_name: String,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // PostgreSQL configuration
    /// PostgreSQL host
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    /// PostgreSQL port
    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    /// PostgreSQL database name
    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    /// PostgreSQL username
    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    /// PostgreSQL password
    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    /// Max PostgreSQL pool size
    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    // Redis configuration
    /// Redis URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    // Sync coordinator configuration
    /// TTL for cached device state in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Deadline for the apply critical path in seconds
    #[serde(default = "default_apply_timeout_secs")]
    pub apply_timeout_secs: u64,

    /// Per-attempt deadline for fan-out sinks in seconds
    #[serde(default = "default_fanout_timeout_secs")]
    pub fanout_timeout_secs: u64,

    /// Retries per fan-out sink after the first attempt
    #[serde(default = "default_fanout_retries")]
    pub fanout_retries: u32,

    // Liveness monitor configuration
    /// Silence window before an online device is considered stale, in seconds
    #[serde(default = "default_staleness_window_secs")]
    pub staleness_window_secs: u64,

    /// Period between liveness sweeps in seconds
    #[serde(default = "default_sweep_period_secs")]
    pub sweep_period_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

// NATS defaults
fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_device_stream() -> String {
    "devices".to_string()
}

fn default_device_subject_prefix() -> String {
    "device".to_string()
}

fn default_session_subject_prefix() -> String {
    "session.device".to_string()
}

fn default_update_consumer_name() -> String {
    "device-update-consumer".to_string()
}

fn default_startup_timeout_secs() -> u64 {
    30
}

// PostgreSQL defaults
fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "pulse".to_string()
}

fn default_postgres_username() -> String {
    "pulse".to_string()
}

fn default_postgres_password() -> String {
    "pulse".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

// Redis defaults
fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

// Sync coordinator defaults
fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_apply_timeout_secs() -> u64 {
    10
}

fn default_fanout_timeout_secs() -> u64 {
    2
}

fn default_fanout_retries() -> u32 {
    1
}

// Liveness monitor defaults
fn default_staleness_window_secs() -> u64 {
    300
}

fn default_sweep_period_secs() -> u64 {
    60
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("PULSE"))
            .build()?
            .try_deserialize()
    }
}
