use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub http_port: u16,
    pub database_url: String,
    /// Broker URL; unset runs the embedded in-process queue and event log.
    pub redis_url: Option<String>,
    pub default_time_limit_ms: i64,
    pub default_memory_mb: i64,
    pub max_concurrent_executions: usize,
    pub visibility_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub sweep_margin_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            http_port: 3000,
            database_url: "sqlite:data/runbox.db".to_string(),
            redis_url: None,
            default_time_limit_ms: 5000,
            default_memory_mb: 256,
            max_concurrent_executions: 10,
            visibility_timeout_secs: 90,
            sweep_interval_secs: 60,
            sweep_margin_secs: 60,
            shutdown_grace_secs: 30,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("HTTP_PORT") {
            config.http_port = port
                .parse()
                .with_context(|| format!("Invalid HTTP_PORT: {port}"))?;
        }
        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = db_url;
        }
        if let Ok(redis_url) = std::env::var("REDIS_URL") {
            if !redis_url.trim().is_empty() {
                config.redis_url = Some(redis_url);
            }
        }
        if let Ok(value) = std::env::var("DEFAULT_TIME_LIMIT_MS") {
            config.default_time_limit_ms = value
                .parse()
                .with_context(|| format!("Invalid DEFAULT_TIME_LIMIT_MS: {value}"))?;
        }
        if let Ok(value) = std::env::var("DEFAULT_MEMORY_MB") {
            config.default_memory_mb = value
                .parse()
                .with_context(|| format!("Invalid DEFAULT_MEMORY_MB: {value}"))?;
        }
        if let Ok(value) = std::env::var("MAX_CONCURRENT_EXECUTIONS") {
            config.max_concurrent_executions = value
                .parse()
                .with_context(|| format!("Invalid MAX_CONCURRENT_EXECUTIONS: {value}"))?;
        }
        if let Ok(value) = std::env::var("VISIBILITY_TIMEOUT_SECS") {
            config.visibility_timeout_secs = value
                .parse()
                .with_context(|| format!("Invalid VISIBILITY_TIMEOUT_SECS: {value}"))?;
        }
        if let Ok(value) = std::env::var("SWEEP_INTERVAL_SECS") {
            config.sweep_interval_secs = value
                .parse()
                .with_context(|| format!("Invalid SWEEP_INTERVAL_SECS: {value}"))?;
        }
        if let Ok(value) = std::env::var("SWEEP_MARGIN_SECS") {
            config.sweep_margin_secs = value
                .parse()
                .with_context(|| format!("Invalid SWEEP_MARGIN_SECS: {value}"))?;
        }
        if let Ok(value) = std::env::var("SHUTDOWN_GRACE_SECS") {
            config.shutdown_grace_secs = value
                .parse()
                .with_context(|| format!("Invalid SHUTDOWN_GRACE_SECS: {value}"))?;
        }

        Ok(config)
    }
}
