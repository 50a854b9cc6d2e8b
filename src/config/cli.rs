use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the esi-gateway binary.
#[derive(Debug, Parser)]
#[command(
    name = "esi-gateway",
    version,
    about = "Cache-aside gateway in front of the EVE Swagger Interface"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "ESI_GATEWAY_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Resolve and validate the configuration, print a summary and exit.
    #[command(name = "check-config")]
    CheckConfig(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
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

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the Redis connection URL.
    #[arg(long = "redis-url", value_name = "URL")]
    pub redis_url: Option<String>,

    /// Override the ESI base URL.
    #[arg(long = "upstream-base-url", value_name = "URL")]
    pub upstream_base_url: Option<String>,

    /// Override the ESI compatibility date (YYYY-MM-DD).
    #[arg(long = "upstream-compatibility-date", value_name = "DATE")]
    pub upstream_compatibility_date: Option<String>,

    /// Override the Accept-Language sent upstream.
    #[arg(long = "upstream-accept-language", value_name = "TAG")]
    pub upstream_accept_language: Option<String>,

    /// Toggle sharing the backoff deadline through Redis.
    #[arg(
        long = "backoff-share-via-cache",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub backoff_share_via_cache: Option<bool>,

    /// Override the cache key version.
    #[arg(long = "cache-version", value_name = "VERSION")]
    pub cache_version: Option<String>,

    /// Override the character freshness window.
    #[arg(long = "cache-character-fresh-seconds", value_name = "SECONDS")]
    pub cache_character_fresh_seconds: Option<u64>,
}
