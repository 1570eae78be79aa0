//! Application configuration loaded from environment.

use std::net::SocketAddr;
use std::time::Duration;

use crate::harness::HarnessConfig;

/// Which transport the hosted harness talks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Redis,
    Loopback,
}

/// Application configuration loaded from `.env` and environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g. `0.0.0.0:3000`).
    pub server_addr: SocketAddr,
    /// Redis connection URL (e.g. `redis://127.0.0.1/`).
    pub redis_url: String,
    /// PostgreSQL connection URL. Publish telemetry stays in memory when unset.
    pub database_url: Option<String>,
    /// Log level: `error`, `warn`, `info`, `debug`, `trace`.
    pub log_level: String,
    pub transport: TransportKind,
    /// Client id the harness presents to the broker.
    pub client_id: String,
    pub ack_timeout: Duration,
    pub ack_timeout_min: Duration,
    pub ack_timeout_max: Duration,
    pub scenario_observe: Duration,
}

impl Config {
    /// Load configuration from environment. Call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_addr = lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let server_addr: SocketAddr = server_addr
            .parse()
            .map_err(|_| ConfigLoadError::InvalidServerAddr)?;

        let redis_url = lookup("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1/".to_string());
        let database_url = lookup("DATABASE_URL").filter(|u| !u.trim().is_empty());
        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let transport = match lookup("HARNESS_TRANSPORT").as_deref().map(str::trim) {
            None | Some("") | Some("redis") => TransportKind::Redis,
            Some("loopback") => TransportKind::Loopback,
            Some(other) => return Err(ConfigLoadError::InvalidTransport(other.to_string())),
        };
        let client_id = lookup("HARNESS_CLIENT_ID")
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "livewire-harness".to_string());

        let ack_timeout = secs(&lookup, "ACK_TIMEOUT_SECS", 5)?;
        let ack_timeout_min = secs(&lookup, "ACK_TIMEOUT_MIN_SECS", 1)?;
        let ack_timeout_max = secs(&lookup, "ACK_TIMEOUT_MAX_SECS", 60)?;
        if ack_timeout_min.is_zero() || ack_timeout_min > ack_timeout_max {
            return Err(ConfigLoadError::InvalidAckBounds);
        }
        let scenario_observe = match lookup("SCENARIO_OBSERVE_MS") {
            Some(v) => Duration::from_millis(parse_u64("SCENARIO_OBSERVE_MS", &v)?),
            None => Duration::from_millis(2000),
        };

        Ok(Self {
            server_addr,
            redis_url,
            database_url,
            log_level,
            transport,
            client_id,
            ack_timeout,
            ack_timeout_min,
            ack_timeout_max,
            scenario_observe,
        })
    }

    pub fn harness_config(&self) -> HarnessConfig {
        HarnessConfig {
            default_ack_timeout: self
                .ack_timeout
                .clamp(self.ack_timeout_min, self.ack_timeout_max),
            min_ack_timeout: self.ack_timeout_min,
            max_ack_timeout: self.ack_timeout_max,
            scenario_observe_timeout: self.scenario_observe,
        }
    }
}

fn secs<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigLoadError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(v) => Ok(Duration::from_secs(parse_u64(key, &v)?)),
        None => Ok(Duration::from_secs(default)),
    }
}

fn parse_u64(key: &'static str, value: &str) -> Result<u64, ConfigLoadError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigLoadError::InvalidNumber {
            key,
            value: value.to_string(),
        })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Invalid SERVER_ADDR")]
    InvalidServerAddr,
    #[error("Invalid HARNESS_TRANSPORT: {0} (expected redis or loopback)")]
    InvalidTransport(String),
    #[error("Invalid {key}: {value}")]
    InvalidNumber { key: &'static str, value: String },
    #[error("ACK_TIMEOUT_MIN_SECS must be positive and not above ACK_TIMEOUT_MAX_SECS")]
    InvalidAckBounds,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigLoadError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server_addr.port(), 3000);
        assert_eq!(config.transport, TransportKind::Redis);
        assert!(config.database_url.is_none());
        let harness = config.harness_config();
        assert_eq!(harness.default_ack_timeout, Duration::from_secs(5));
        assert_eq!(harness.min_ack_timeout, Duration::from_secs(1));
        assert_eq!(harness.max_ack_timeout, Duration::from_secs(60));
        assert_eq!(harness.scenario_observe_timeout, Duration::from_millis(2000));
    }

    #[test]
    fn overrides() {
        let config = load(&[
            ("HARNESS_TRANSPORT", "loopback"),
            ("HARNESS_CLIENT_ID", "probe"),
            ("ACK_TIMEOUT_SECS", "90"),
            ("DATABASE_URL", "postgres://localhost/livewire"),
        ])
        .unwrap();
        assert_eq!(config.transport, TransportKind::Loopback);
        assert_eq!(config.client_id, "probe");
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/livewire"));
        // Default is clamped into the configured bounds.
        assert_eq!(config.harness_config().default_ack_timeout, Duration::from_secs(60));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            load(&[("SERVER_ADDR", "nope")]),
            Err(ConfigLoadError::InvalidServerAddr)
        ));
        assert!(matches!(
            load(&[("HARNESS_TRANSPORT", "websocket")]),
            Err(ConfigLoadError::InvalidTransport(_))
        ));
        assert!(matches!(
            load(&[("ACK_TIMEOUT_SECS", "five")]),
            Err(ConfigLoadError::InvalidNumber { key: "ACK_TIMEOUT_SECS", .. })
        ));
        assert!(matches!(
            load(&[("ACK_TIMEOUT_MIN_SECS", "10"), ("ACK_TIMEOUT_MAX_SECS", "5")]),
            Err(ConfigLoadError::InvalidAckBounds)
        ));
    }
}
