//! Configuration loading and constants.
//!
//! Configuration comes from an optional TOML file, then environment variables
//! are overlaid on top (the usual way the service is deployed in containers).
//! Nothing here validates connection settings beyond presence: a missing
//! database host is reported by the probe, not at startup.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use const_format::formatcp;
use serde::Deserialize;

use crate::db::DatabaseTarget;
use crate::logging::Level;

// =============================================================================
// HTTP Response Cache Control
// =============================================================================

/// Static assets (CSS, JS)
pub const HTTP_CACHE_STATIC_MAX_AGE: u32 = 3600;

pub const CACHE_CONTROL_STATIC: &str = formatcp!("public, max-age={}", HTTP_CACHE_STATIC_MAX_AGE);

/// Status responses must always reflect a fresh probe
pub const CACHE_CONTROL_NO_STORE: &str = "no-store";

// =============================================================================
// Database Defaults
// =============================================================================

/// Default PostgreSQL port
pub const DEFAULT_DB_PORT: u16 = 5432;

/// Default maximum pool size
pub const DEFAULT_DB_POOL_SIZE: u32 = 5;

/// Bound on connection acquisition and on a single probe round trip
pub const DEFAULT_DB_TIMEOUT_MS: u64 = 5000;

/// Capacity of the pool lifecycle broadcast channel
pub const POOL_EVENT_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// Logging Defaults
// =============================================================================

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "dbcheck=debug,tower_http=info,sqlx=warn";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Default per-delivery timeout for the remote log sink
pub const DEFAULT_SINK_TIMEOUT_MS: u64 = 2000;

/// Default number of records the remote sink queues before dropping
pub const DEFAULT_SINK_QUEUE_CAPACITY: usize = 1024;

/// How long queued remote records get to go out after the server stops
pub const SINK_DRAIN_TIMEOUT_MS: u64 = 5000;

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Directory for static files
pub const DEFAULT_STATIC_DIR: &str = "static";

/// Default listen address
pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_HTTP_PORT: u16 = 3000;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub http: HttpServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub deployment: DeploymentConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "HttpServerConfig::default_host")]
    pub host: String,
    #[serde(default = "HttpServerConfig::default_port")]
    pub port: u16,
    /// Directory served under /static
    #[serde(default = "HttpServerConfig::default_static_dir")]
    pub static_dir: String,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            static_dir: Self::default_static_dir(),
        }
    }
}

impl HttpServerConfig {
    fn default_host() -> String {
        DEFAULT_HTTP_HOST.to_string()
    }

    fn default_port() -> u16 {
        DEFAULT_HTTP_PORT
    }

    fn default_static_dir() -> String {
        DEFAULT_STATIC_DIR.to_string()
    }
}

/// TLS policy for database connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    /// Plain TCP
    Disable,
    /// Encrypt, but do not verify the server certificate
    Require,
    /// Encrypt and verify the certificate chain and host name
    #[default]
    VerifyFull,
}

impl FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disable" | "false" | "off" => Ok(SslMode::Disable),
            "require" => Ok(SslMode::Require),
            "verify-full" | "true" | "on" => Ok(SslMode::VerifyFull),
            other => Err(format!("unknown ssl mode: {other}")),
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SslMode::Disable => "disable",
            SslMode::Require => "require",
            SslMode::VerifyFull => "verify-full",
        })
    }
}

/// Database connection settings
#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: Option<String>,
    #[serde(default = "DatabaseConfig::default_port")]
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Database name
    pub name: Option<String>,
    #[serde(default)]
    pub ssl_mode: SslMode,
    /// PEM bundle used to verify the server certificate
    pub ssl_root_cert: Option<String>,
    #[serde(default = "DatabaseConfig::default_pool_size")]
    pub pool_size: u32,
    /// Acquisition and probe timeout in milliseconds
    #[serde(default = "DatabaseConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: Self::default_port(),
            user: None,
            password: None,
            name: None,
            ssl_mode: SslMode::default(),
            ssl_root_cert: None,
            pool_size: Self::default_pool_size(),
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    fn default_port() -> u16 {
        DEFAULT_DB_PORT
    }

    fn default_pool_size() -> u32 {
        DEFAULT_DB_POOL_SIZE
    }

    fn default_timeout_ms() -> u64 {
        DEFAULT_DB_TIMEOUT_MS
    }

    /// Required settings that are absent or blank, in a fixed order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let blank = |v: &Option<String>| v.as_deref().map(str::trim).unwrap_or("").is_empty();
        let mut missing = Vec::new();
        if blank(&self.host) {
            missing.push("host");
        }
        if blank(&self.user) {
            missing.push("user");
        }
        if blank(&self.name) {
            missing.push("database name");
        }
        missing
    }

    pub fn target(&self) -> DatabaseTarget {
        DatabaseTarget {
            host: self.host.clone(),
            port: self.port,
            database: self.name.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("name", &self.name)
            .field("ssl_mode", &self.ssl_mode)
            .field("ssl_root_cert", &self.ssl_root_cert)
            .field("pool_size", &self.pool_size)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
    /// Records below this level are dropped before reaching any sink
    #[serde(default = "LoggingConfig::default_minimum_level")]
    pub minimum_level: Level,
    /// Optional remote collector
    pub remote_sink: Option<RemoteSinkConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: Self::default_format(),
            minimum_level: Self::default_minimum_level(),
            remote_sink: None,
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }

    fn default_minimum_level() -> Level {
        Level::Info
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

/// Remote log collector settings
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSinkConfig {
    /// URL records are POSTed to as JSON
    pub url: String,
    #[serde(default = "RemoteSinkConfig::default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "RemoteSinkConfig::default_queue_capacity")]
    pub queue_capacity: usize,
}

impl RemoteSinkConfig {
    fn new(url: String) -> Self {
        Self {
            url,
            timeout_ms: Self::default_timeout_ms(),
            queue_capacity: Self::default_queue_capacity(),
        }
    }

    fn default_timeout_ms() -> u64 {
        DEFAULT_SINK_TIMEOUT_MS
    }

    fn default_queue_capacity() -> usize {
        DEFAULT_SINK_QUEUE_CAPACITY
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Facts about where the service runs, shown on the status page
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeploymentConfig {
    pub region: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(contents) => Self::from_toml(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    path = %path.as_ref().display(),
                    "Config file not found, using defaults"
                );
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Overlay environment variables. `lookup` is `std::env::var` in production.
    ///
    /// Unparseable values are ignored with a warning and the previous value
    /// is kept.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("HOST") {
            self.http.host = v;
        }
        parse_into(&get, "PORT", &mut self.http.port);
        if let Some(v) = get("STATIC_DIR") {
            self.http.static_dir = v;
        }

        let db = &mut self.database;
        if let Some(v) = get("DB_HOST") {
            db.host = Some(v);
        }
        if let Some(v) = get("DB_USER") {
            db.user = Some(v);
        }
        if let Some(v) = get("DB_PASS") {
            db.password = Some(v);
        }
        if let Some(v) = get("DB_NAME") {
            db.name = Some(v);
        }
        parse_into(&get, "DB_PORT", &mut db.port);
        parse_into(&get, "DB_SSL_MODE", &mut db.ssl_mode);
        if let Some(v) = get("DB_SSL_ROOT_CERT") {
            db.ssl_root_cert = Some(v);
        }
        parse_into(&get, "DB_POOL_SIZE", &mut db.pool_size);
        parse_into(&get, "DB_TIMEOUT_MS", &mut db.timeout_ms);

        parse_into(&get, "LOG_LEVEL", &mut self.logging.minimum_level);
        if let Some(v) = get("LOG_FORMAT") {
            self.logging.format = v;
        }
        if let Some(url) = get("LOG_SINK_URL") {
            match &mut self.logging.remote_sink {
                Some(sink) => sink.url = url,
                None => self.logging.remote_sink = Some(RemoteSinkConfig::new(url)),
            }
        }

        if let Some(v) = get("AWS_REGION") {
            self.deployment.region = Some(v);
        }
    }
}

fn parse_into<T, G>(get: &G, key: &str, slot: &mut T)
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        match raw.trim().parse() {
            Ok(value) => *slot = value,
            Err(e) => tracing::warn!(key, value = %raw, error = %e, "Ignoring invalid environment value"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
