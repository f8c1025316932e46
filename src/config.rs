use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

fn var_or(key: &'static str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        info!("{} not set, using default: {}", key, default);
        default.to_string()
    })
}

fn parse_var<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = var_or(key, default);
    value
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

/// Server configuration.
///
/// | Env Var              | Default                               |
/// |----------------------|---------------------------------------|
/// | `DATABASE_URL`       | `sqlite://course_planner.db?mode=rwc` |
/// | `BIND_ADDR`          | `127.0.0.1:3000`                      |
/// | `DB_MAX_CONNECTIONS` | `5`                                   |
/// | `DB_RETRY_ATTEMPTS`  | `3`                                   |
/// | `DB_RETRY_BASE_MS`   | `50`                                  |
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    pub retry: RetryPolicy,
}

impl AppConfig {
    pub fn new_from_env() -> Result<Self, ConfigError> {
        let database_url = var_or("DATABASE_URL", "sqlite://course_planner.db?mode=rwc");
        let bind_addr = parse_var("BIND_ADDR", "127.0.0.1:3000")?;
        let max_connections = parse_var("DB_MAX_CONNECTIONS", "5")?;
        let max_attempts: u32 = parse_var("DB_RETRY_ATTEMPTS", "3")?;
        let base_ms: u64 = parse_var("DB_RETRY_BASE_MS", "50")?;

        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "DB_RETRY_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            database_url,
            bind_addr,
            max_connections,
            retry: RetryPolicy {
                max_attempts,
                initial_delay: Duration::from_millis(base_ms),
                ..Default::default()
            },
        })
    }
}

/// Settings for the schedule client talking to the Enrollment API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_id: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: user_id.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn new_from_env() -> Result<Self, ConfigError> {
        let base_url =
            env::var("PLANNER_API_URL").map_err(|_| ConfigError::Missing("PLANNER_API_URL"))?;
        let user_id =
            env::var("PLANNER_USER_ID").map_err(|_| ConfigError::Missing("PLANNER_USER_ID"))?;
        let timeout_secs: u64 = parse_var("PLANNER_TIMEOUT_SECS", "10")?;

        Ok(Self::new(base_url, user_id).with_timeout(Duration::from_secs(timeout_secs)))
    }
}
