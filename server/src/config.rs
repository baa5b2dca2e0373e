//! Startup configuration from environment variables.
//!
//! A missing `DATABASE_URL` is a deployment error and fails startup; every
//! other knob has a default.

use anyhow::Result;
use std::time::Duration;

fn optional_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub retry_count: u32,
    pub acquire_timeout: Duration,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("Missing required configuration: DATABASE_URL"))?;
        Ok(Self {
            url,
            retry_count: optional_parse("DB_RETRY_COUNT", 10),
            acquire_timeout: Duration::from_secs(optional_parse("DB_ACQUIRE_TIMEOUT_SEC", 30)),
            max_connections: optional_parse("DB_MAX_CONNECTIONS", 15),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub database: DatabaseConfig,
    pub redis_url: String,
    /// Per-side budget for games created without an explicit time control.
    pub default_time_control_minutes: u32,
    /// Connections idle longer than this are reaped.
    pub liveness_timeout: Duration,
    pub sweep_interval: Duration,
    /// Cadence of `timer_update` broadcasts while a game runs.
    pub timer_broadcast_period: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: optional_parse("PORT", 3000),
            database: DatabaseConfig::from_env()?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            default_time_control_minutes: optional_parse("DEFAULT_TIME_CONTROL_MINUTES", 30),
            liveness_timeout: Duration::from_secs(optional_parse("LIVENESS_TIMEOUT_SECS", 180)),
            sweep_interval: Duration::from_secs(optional_parse("SWEEP_INTERVAL_SECS", 60)),
            timer_broadcast_period: Duration::from_secs(optional_parse("TIMER_BROADCAST_SECS", 5)),
        })
    }
}

#[cfg(test)]
impl Default for ServerConfig {
    /// Test configuration; the database section is never dialed in tests.
    fn default() -> Self {
        Self {
            port: 0,
            database: DatabaseConfig {
                url: "postgres://unused".into(),
                retry_count: 1,
                acquire_timeout: Duration::from_secs(1),
                max_connections: 1,
            },
            redis_url: "redis://127.0.0.1:6379".into(),
            default_time_control_minutes: 30,
            liveness_timeout: Duration::from_secs(180),
            sweep_interval: Duration::from_secs(60),
            timer_broadcast_period: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn missing_database_url_fails() {
        std::env::remove_var("DATABASE_URL");
        let err = ServerConfig::from_env().expect_err("expected configuration error");
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    #[serial]
    fn defaults_applied() {
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::remove_var("PORT");
        std::env::remove_var("REDIS_URL");
        std::env::remove_var("DEFAULT_TIME_CONTROL_MINUTES");
        std::env::remove_var("LIVENESS_TIMEOUT_SECS");

        let cfg = ServerConfig::from_env().unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(cfg.default_time_control_minutes, 30);
        assert_eq!(cfg.liveness_timeout, Duration::from_secs(180));
        assert_eq!(cfg.sweep_interval, Duration::from_secs(60));
        assert_eq!(cfg.timer_broadcast_period, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn overrides_applied() {
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::set_var("PORT", "4010");
        std::env::set_var("DEFAULT_TIME_CONTROL_MINUTES", "5");
        std::env::set_var("LIVENESS_TIMEOUT_SECS", "30");

        let cfg = ServerConfig::from_env().unwrap();
        assert_eq!(cfg.port, 4010);
        assert_eq!(cfg.default_time_control_minutes, 5);
        assert_eq!(cfg.liveness_timeout, Duration::from_secs(30));

        std::env::remove_var("PORT");
        std::env::remove_var("DEFAULT_TIME_CONTROL_MINUTES");
        std::env::remove_var("LIVENESS_TIMEOUT_SECS");
    }
}
