//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Unset or unparsable values fall back to
//! the defaults listed on each field.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP/WebSocket server to
    /// (`GATEWAY_HOST`, default `0.0.0.0`; `GATEWAY_PORT`, default `50051`).
    pub listen_addr: SocketAddr,

    /// Device store connection string (`DATABASE_URL`).
    pub database_url: String,

    /// Maximum number of database connections in the pool.
    pub database_max_connections: u32,

    /// Timeout in seconds for acquiring a database connection.
    pub database_connect_timeout_secs: u64,

    /// WebSocket endpoint of the protocol bridge (`PROTOCOL_BRIDGE_URL`).
    pub protocol_bridge_url: String,

    /// Seconds allowed for a device to connect (`CONNECT_TIMEOUT_SECS`).
    pub connect_timeout_secs: u64,

    /// Whether to request a state sync right after a device connects.
    pub post_connect_sync: bool,

    /// Events buffered per stream subscriber before it is dropped.
    pub subscriber_buffer: usize,

    /// Seconds allowed for each disconnect during shutdown.
    pub shutdown_disconnect_timeout_secs: u64,

    /// Log output format (`LOG_FORMAT`, `text` or `json`).
    pub log_format: LogFormat,
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `GATEWAY_HOST` is set but is not an IP
    /// address.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `GATEWAY_HOST` is not an IP address.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("GATEWAY_HOST")
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        let ip: IpAddr = host
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidHost(host.clone()))?;
        let port = parse_var(&lookup, "GATEWAY_PORT", 50051u16);

        let database_url = lookup("DATABASE_URL")
            .unwrap_or_else(|| "sqlite://devicestore.db?mode=rwc".to_string());
        let protocol_bridge_url =
            lookup("PROTOCOL_BRIDGE_URL").unwrap_or_else(|| "ws://127.0.0.1:8765".to_string());

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
            Some(f) if f == "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            listen_addr: SocketAddr::new(ip, port),
            database_url,
            database_max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS", 5),
            database_connect_timeout_secs: parse_var(&lookup, "DATABASE_CONNECT_TIMEOUT_SECS", 5),
            protocol_bridge_url,
            connect_timeout_secs: parse_var(&lookup, "CONNECT_TIMEOUT_SECS", 30),
            post_connect_sync: parse_bool(&lookup, "POST_CONNECT_SYNC", true),
            subscriber_buffer: parse_var(&lookup, "SUBSCRIBER_BUFFER", 256),
            shutdown_disconnect_timeout_secs: parse_var(
                &lookup,
                "SHUTDOWN_DISCONNECT_TIMEOUT_SECS",
                5,
            ),
            log_format,
        })
    }

    /// Database acquire timeout.
    #[must_use]
    pub const fn database_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.database_connect_timeout_secs)
    }

    /// Device connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Per-session disconnect timeout during shutdown.
    #[must_use]
    pub const fn shutdown_disconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_disconnect_timeout_secs)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `GATEWAY_HOST` is not a valid IP address.
    #[error("invalid GATEWAY_HOST: {0}")]
    InvalidHost(String),
}

/// Parses a variable as `T`, returning `default` on missing or invalid values.
fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parses a variable as a boolean. Accepts `"true"`, `"1"`, `"false"`, `"0"`
/// (case-insensitive). Returns `default` otherwise.
fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
