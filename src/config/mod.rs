//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{CliArgs, Command, DatabaseOverride, ServeArgs, ServeOverrides, WarmupCheckArgs};

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "orderline";
const ENV_PREFIX: &str = "ORDERLINE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_DB_CONNECT_ATTEMPTS: u32 = 2;
const DEFAULT_DB_CONNECT_RETRY_MILLIS: u64 = 1_000;
const DEFAULT_DB_STORE_TIMEOUT_MILLIS: u64 = 5_000;
const DEFAULT_CACHE_CAPACITY: usize = 1024;
const DEFAULT_INGEST_MAX_IN_FLIGHT: u32 = 16;
const DEFAULT_INGEST_REDELIVERY_DELAY_MILLIS: u64 = 1_000;
const DEFAULT_INGEST_ACK_WAIT_MILLIS: u64 = 5_000;
const DEFAULT_INGEST_MAX_PAYLOAD_BYTES: u64 = 1024 * 1024;
const DEFAULT_NATS_STREAM: &str = "ORDERS";
const DEFAULT_NATS_SUBJECT: &str = "orders.created";
const DEFAULT_NATS_CONSUMER: &str = "orderline";
const DEFAULT_NATS_CONNECT_TIMEOUT_MILLIS: u64 = 2_000;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub ingest: IngestSettings,
    pub nats: NatsSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
    pub connect_attempts: NonZeroU32,
    pub connect_retry_delay: Duration,
    /// Upper bound for a single store call made by ingestion, warmup or reads.
    pub store_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub capacity: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub max_in_flight: NonZeroU32,
    pub redelivery_delay: Duration,
    /// Unsettled deliveries are redelivered once this elapses.
    pub ack_wait: Duration,
    pub max_payload_bytes: NonZeroUsize,
}

/// JetStream connection and topology.
#[derive(Debug, Clone)]
pub struct NatsSettings {
    pub url: Option<String>,
    pub stream: String,
    pub subject: String,
    /// Durable consumer name.
    pub consumer: String,
    pub connect_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::WarmupCheck(args)) => raw.apply_warmup_check_overrides(args),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    ingest: RawIngestSettings,
    nats: RawNatsSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_database_override(&overrides.database);
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(millis) = overrides.database_store_timeout_millis {
            self.database.store_timeout_millis = Some(millis);
        }
        if let Some(capacity) = overrides.cache_capacity {
            self.cache.capacity = Some(capacity);
        }
        if let Some(max) = overrides.ingest_max_in_flight {
            self.ingest.max_in_flight = Some(max);
        }
        if let Some(millis) = overrides.ingest_redelivery_delay_millis {
            self.ingest.redelivery_delay_millis = Some(millis);
        }
        if let Some(millis) = overrides.ingest_ack_wait_millis {
            self.ingest.ack_wait_millis = Some(millis);
        }
        if let Some(url) = overrides.nats_url.as_ref() {
            self.nats.url = Some(url.clone());
        }
    }

    fn apply_warmup_check_overrides(&mut self, args: &WarmupCheckArgs) {
        self.apply_database_override(&args.database);
        if let Some(capacity) = args.cache_capacity {
            self.cache.capacity = Some(capacity);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            ingest,
            nats,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            ingest: build_ingest_settings(ingest)?,
            nats: build_nats_settings(nats)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr =
        parse_socket_addr(&host, port).map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = trimmed(database.url);

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;
    let connect_attempts = non_zero_u32(
        database
            .connect_attempts
            .unwrap_or(DEFAULT_DB_CONNECT_ATTEMPTS)
            .into(),
        "database.connect_attempts",
    )?;
    let connect_retry_delay = Duration::from_millis(
        database
            .connect_retry_millis
            .unwrap_or(DEFAULT_DB_CONNECT_RETRY_MILLIS),
    );
    let store_timeout = positive_millis(
        database
            .store_timeout_millis
            .unwrap_or(DEFAULT_DB_STORE_TIMEOUT_MILLIS),
        "database.store_timeout_millis",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
        connect_attempts,
        connect_retry_delay,
        store_timeout,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let capacity = cache.capacity.unwrap_or(DEFAULT_CACHE_CAPACITY);
    let capacity = NonZeroUsize::new(capacity)
        .ok_or_else(|| LoadError::invalid("cache.capacity", "must be greater than zero"))?;
    Ok(CacheSettings { capacity })
}

fn build_ingest_settings(ingest: RawIngestSettings) -> Result<IngestSettings, LoadError> {
    let max_in_flight = non_zero_u32(
        ingest
            .max_in_flight
            .unwrap_or(DEFAULT_INGEST_MAX_IN_FLIGHT)
            .into(),
        "ingest.max_in_flight",
    )?;
    let redelivery_delay = Duration::from_millis(
        ingest
            .redelivery_delay_millis
            .unwrap_or(DEFAULT_INGEST_REDELIVERY_DELAY_MILLIS),
    );

    let ack_wait = positive_millis(
        ingest
            .ack_wait_millis
            .unwrap_or(DEFAULT_INGEST_ACK_WAIT_MILLIS),
        "ingest.ack_wait_millis",
    )?;

    let max_payload_value = ingest
        .max_payload_bytes
        .unwrap_or(DEFAULT_INGEST_MAX_PAYLOAD_BYTES);
    let max_payload_bytes = usize::try_from(max_payload_value)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            LoadError::invalid(
                "ingest.max_payload_bytes",
                "must be greater than zero and fit in usize",
            )
        })?;

    Ok(IngestSettings {
        max_in_flight,
        redelivery_delay,
        ack_wait,
        max_payload_bytes,
    })
}

fn build_nats_settings(nats: RawNatsSettings) -> Result<NatsSettings, LoadError> {
    let stream = non_blank(nats.stream, DEFAULT_NATS_STREAM, "nats.stream")?;
    let subject = non_blank(nats.subject, DEFAULT_NATS_SUBJECT, "nats.subject")?;
    let consumer = non_blank(nats.consumer, DEFAULT_NATS_CONSUMER, "nats.consumer")?;
    let connect_timeout = positive_millis(
        nats.connect_timeout_millis
            .unwrap_or(DEFAULT_NATS_CONNECT_TIMEOUT_MILLIS),
        "nats.connect_timeout_millis",
    )?;

    Ok(NatsSettings {
        url: trimmed(nats.url),
        stream,
        subject,
        consumer,
        connect_timeout,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
    connect_attempts: Option<u32>,
    connect_retry_millis: Option<u64>,
    store_timeout_millis: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIngestSettings {
    max_in_flight: Option<u32>,
    redelivery_delay_millis: Option<u64>,
    ack_wait_millis: Option<u64>,
    max_payload_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawNatsSettings {
    url: Option<String>,
    stream: Option<String>,
    subject: Option<String>,
    consumer: Option<String>,
    connect_timeout_millis: Option<u64>,
}

/// Trim `value`; blank means absent.
fn trimmed(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_blank(value: Option<String>, default: &str, key: &'static str) -> Result<String, LoadError> {
    match value {
        None => Ok(default.to_string()),
        Some(value) => {
            trimmed(Some(value)).ok_or_else(|| LoadError::invalid(key, "must not be blank"))
        }
    }
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }

    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;

    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn positive_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

#[cfg(test)]
mod tests;
