use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the orderline binary.
#[derive(Debug, Parser)]
#[command(
    name = "orderline",
    version,
    about = "Order ingestion service with a bounded read cache"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "ORDERLINE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Warm the cache, consume the order stream and serve HTTP reads.
    Serve(Box<ServeArgs>),
    /// Connect to the store, warm a cache and report how many orders were loaded.
    #[command(name = "warmup-check")]
    WarmupCheck(WarmupCheckArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WarmupCheckArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the cache capacity used for the check.
    #[arg(long = "cache-capacity", value_name = "COUNT")]
    pub cache_capacity: Option<usize>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the HTTP listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the HTTP listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the per-call store timeout.
    #[arg(long = "database-store-timeout-millis", value_name = "MILLIS")]
    pub database_store_timeout_millis: Option<u64>,

    /// Override the number of orders kept in memory.
    #[arg(long = "cache-capacity", value_name = "COUNT")]
    pub cache_capacity: Option<usize>,

    /// Override the number of messages processed concurrently.
    #[arg(long = "ingest-max-in-flight", value_name = "COUNT")]
    pub ingest_max_in_flight: Option<u32>,

    /// Override the delay before a rejected message is redelivered.
    #[arg(long = "ingest-redelivery-delay-millis", value_name = "MILLIS")]
    pub ingest_redelivery_delay_millis: Option<u64>,

    /// Override how long a delivery may stay unacknowledged.
    #[arg(long = "ingest-ack-wait-millis", value_name = "MILLIS")]
    pub ingest_ack_wait_millis: Option<u64>,

    /// Override the NATS server URL.
    #[arg(long = "nats-url", value_name = "URL")]
    pub nats_url: Option<String>,
}
