//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

use std::{net::SocketAddr, num::NonZeroU32, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use time::{Date, macros::format_description};
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::{
    cache::CachePolicy,
    infra::upstream::{BackoffPolicy, UpstreamConfig},
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "esi-gateway";
const ENV_PREFIX: &str = "ESI_GATEWAY";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/0";
const DEFAULT_UPSTREAM_BASE_URL: &str = "https://esi.evetech.net";
const DEFAULT_COMPATIBILITY_DATE: &str = "2025-09-30";
const DEFAULT_ACCEPT_LANGUAGE: &str = "en";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;
const DEFAULT_FALLBACK_TTL_SECS: u64 = 86_400;
const DEFAULT_SOFT_REMAIN: u32 = 5;
const DEFAULT_HARD_REMAIN: u32 = 1;
const MAX_REMAIN: u32 = 100;
const DEFAULT_BACKOFF_KEY: &str = "esi:cooldown-until";
const DEFAULT_JITTER_MS: u64 = 150;
const DEFAULT_CLOCK_SKEW_MS: u64 = 250;
const MAX_JITTER_OR_SKEW_MS: u64 = 2_000;
const DEFAULT_RESET_SECS: u64 = 60;
const DEFAULT_CACHE_VERSION: &str = "v1";
const DEFAULT_CHARACTER_FRESH_SECS: u64 = 600;
const DEFAULT_LOCK_TTL_SECS: u64 = 15;
const DEFAULT_MIN_PAYLOAD_TTL_SECS: u64 = 60;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub upstream: UpstreamSettings,
    pub backoff: BackoffSettings,
    pub cache: CacheSettings,
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

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Required by `serve`; `check-config` tolerates its absence.
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: Url,
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub base_url: Url,
    pub compatibility_date: String,
    pub accept_language: String,
    pub timeout: Duration,
    pub fallback_ttl: Duration,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct BackoffSettings {
    pub share_via_cache: bool,
    pub soft_remain: u32,
    pub hard_remain: u32,
    pub key: String,
    pub jitter_ms: u64,
    pub clock_skew_ms: u64,
    pub raise_on_success: bool,
    pub default_reset: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub version: String,
    pub character_fresh: Duration,
    pub lock_ttl: Duration,
    pub min_payload_ttl: Duration,
}

impl Settings {
    pub fn upstream_config(&self) -> UpstreamConfig {
        UpstreamConfig {
            base_url: self.upstream.base_url.clone(),
            compatibility_date: self.upstream.compatibility_date.clone(),
            accept_language: self.upstream.accept_language.clone(),
            timeout: self.upstream.timeout,
            user_agent: self.upstream.user_agent.clone(),
        }
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            soft_remain: self.backoff.soft_remain,
            hard_remain: self.backoff.hard_remain,
            jitter_ms: self.backoff.jitter_ms,
            clock_skew_ms: self.backoff.clock_skew_ms,
            raise_on_success: self.backoff.raise_on_success,
            default_reset: self.backoff.default_reset,
            shared_key: self.backoff.key.clone(),
        }
    }

    pub fn character_cache_policy(&self) -> CachePolicy {
        CachePolicy {
            fresh: self.cache.character_fresh,
            fallback_ttl: self.upstream.fallback_ttl,
            min_payload_ttl: self.cache.min_payload_ttl,
            lock_ttl: self.cache.lock_ttl,
        }
    }

    /// Human-readable summary with credentials masked.
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        vec![
            ("server.addr", self.server.addr.to_string()),
            (
                "server.graceful_shutdown_seconds",
                self.server.graceful_shutdown.as_secs().to_string(),
            ),
            ("logging.level", self.logging.level.to_string()),
            ("logging.format", format!("{:?}", self.logging.format)),
            (
                "database.url",
                self.database
                    .url
                    .as_deref()
                    .map(mask_credentials)
                    .unwrap_or_else(|| "<unset>".to_string()),
            ),
            (
                "database.max_connections",
                self.database.max_connections.to_string(),
            ),
            ("redis.url", mask_credentials(self.redis.url.as_str())),
            ("upstream.base_url", self.upstream.base_url.to_string()),
            (
                "upstream.compatibility_date",
                self.upstream.compatibility_date.clone(),
            ),
            (
                "upstream.accept_language",
                self.upstream.accept_language.clone(),
            ),
            (
                "upstream.fallback_ttl_seconds",
                self.upstream.fallback_ttl.as_secs().to_string(),
            ),
            (
                "backoff.share_via_cache",
                self.backoff.share_via_cache.to_string(),
            ),
            (
                "backoff.soft_remain/hard_remain",
                format!("{}/{}", self.backoff.soft_remain, self.backoff.hard_remain),
            ),
            ("cache.version", self.cache.version.clone()),
            (
                "cache.character_fresh_seconds",
                self.cache.character_fresh.as_secs().to_string(),
            ),
        ]
    }
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
        Some(Command::Serve(args)) | Some(Command::CheckConfig(args)) => {
            raw.apply_serve_overrides(&args.overrides)
        }
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    redis: RawRedisSettings,
    upstream: RawUpstreamSettings,
    backoff: RawBackoffSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
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
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(url) = overrides.redis_url.as_ref() {
            self.redis.url = Some(url.clone());
        }
        if let Some(url) = overrides.upstream_base_url.as_ref() {
            self.upstream.base_url = Some(url.clone());
        }
        if let Some(date) = overrides.upstream_compatibility_date.as_ref() {
            self.upstream.compatibility_date = Some(date.clone());
        }
        if let Some(language) = overrides.upstream_accept_language.as_ref() {
            self.upstream.accept_language = Some(language.clone());
        }
        if let Some(share) = overrides.backoff_share_via_cache {
            self.backoff.share_via_cache = Some(share);
        }
        if let Some(version) = overrides.cache_version.as_ref() {
            self.cache.version = Some(version.clone());
        }
        if let Some(seconds) = overrides.cache_character_fresh_seconds {
            self.cache.character_fresh_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            redis,
            upstream,
            backoff,
            cache,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let redis = build_redis_settings(redis)?;
        let upstream = build_upstream_settings(upstream)?;
        let backoff = build_backoff_settings(backoff)?;
        let cache = build_cache_settings(cache)?;

        if cache.character_fresh > upstream.fallback_ttl {
            return Err(LoadError::invalid(
                "cache.character_fresh_seconds",
                format!(
                    "must not exceed upstream.fallback_ttl_seconds ({})",
                    upstream.fallback_ttl.as_secs()
                ),
            ));
        }

        Ok(Self {
            server,
            logging,
            database,
            redis,
            upstream,
            backoff,
            cache,
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

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

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
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_value = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = non_zero_u32(max_value.into(), "database.max_connections")?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_redis_settings(redis: RawRedisSettings) -> Result<RedisSettings, LoadError> {
    let raw = redis.url.unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());
    let url = Url::parse(raw.trim())
        .map_err(|err| LoadError::invalid("redis.url", format!("failed to parse: {err}")))?;
    if !matches!(url.scheme(), "redis" | "rediss") {
        return Err(LoadError::invalid(
            "redis.url",
            "scheme must be redis or rediss",
        ));
    }
    Ok(RedisSettings { url })
}

fn build_upstream_settings(upstream: RawUpstreamSettings) -> Result<UpstreamSettings, LoadError> {
    let raw_base = upstream
        .base_url
        .unwrap_or_else(|| DEFAULT_UPSTREAM_BASE_URL.to_string());
    let base_url = Url::parse(raw_base.trim()).map_err(|err| {
        LoadError::invalid("upstream.base_url", format!("failed to parse: {err}"))
    })?;
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "upstream.base_url",
            "scheme must be http or https",
        ));
    }

    let compatibility_date = upstream
        .compatibility_date
        .unwrap_or_else(|| DEFAULT_COMPATIBILITY_DATE.to_string());
    Date::parse(&compatibility_date, format_description!("[year]-[month]-[day]")).map_err(
        |err| LoadError::invalid("upstream.compatibility_date", format!("expected YYYY-MM-DD: {err}")),
    )?;

    let accept_language = upstream
        .accept_language
        .unwrap_or_else(|| DEFAULT_ACCEPT_LANGUAGE.to_string());
    if !is_language_tag(&accept_language) {
        return Err(LoadError::invalid(
            "upstream.accept_language",
            "expected a language tag like `en` or `en-US`",
        ));
    }

    let timeout_secs = upstream
        .timeout_seconds
        .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "upstream.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let fallback_secs = upstream
        .fallback_ttl_seconds
        .unwrap_or(DEFAULT_FALLBACK_TTL_SECS);
    if fallback_secs == 0 {
        return Err(LoadError::invalid(
            "upstream.fallback_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let user_agent = upstream
        .user_agent
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| format!("esi-gateway/{}", env!("CARGO_PKG_VERSION")));

    Ok(UpstreamSettings {
        base_url,
        compatibility_date,
        accept_language,
        timeout: Duration::from_secs(timeout_secs),
        fallback_ttl: Duration::from_secs(fallback_secs),
        user_agent,
    })
}

fn build_backoff_settings(backoff: RawBackoffSettings) -> Result<BackoffSettings, LoadError> {
    let soft_remain = backoff.soft_remain.unwrap_or(DEFAULT_SOFT_REMAIN);
    if !(1..=MAX_REMAIN).contains(&soft_remain) {
        return Err(LoadError::invalid(
            "backoff.soft_remain",
            format!("must be between 1 and {MAX_REMAIN}"),
        ));
    }
    let hard_remain = backoff.hard_remain.unwrap_or(DEFAULT_HARD_REMAIN);
    if !(1..=MAX_REMAIN).contains(&hard_remain) {
        return Err(LoadError::invalid(
            "backoff.hard_remain",
            format!("must be between 1 and {MAX_REMAIN}"),
        ));
    }
    if hard_remain > soft_remain {
        return Err(LoadError::invalid(
            "backoff.hard_remain",
            "must not exceed backoff.soft_remain",
        ));
    }

    let key = backoff
        .key
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_BACKOFF_KEY.to_string());
    if key.is_empty() {
        return Err(LoadError::invalid("backoff.key", "must not be empty"));
    }

    let jitter_ms = backoff.jitter_ms.unwrap_or(DEFAULT_JITTER_MS);
    if jitter_ms > MAX_JITTER_OR_SKEW_MS {
        return Err(LoadError::invalid(
            "backoff.jitter_ms",
            format!("must not exceed {MAX_JITTER_OR_SKEW_MS}"),
        ));
    }
    let clock_skew_ms = backoff.clock_skew_ms.unwrap_or(DEFAULT_CLOCK_SKEW_MS);
    if clock_skew_ms > MAX_JITTER_OR_SKEW_MS {
        return Err(LoadError::invalid(
            "backoff.clock_skew_ms",
            format!("must not exceed {MAX_JITTER_OR_SKEW_MS}"),
        ));
    }

    let reset_secs = backoff
        .default_reset_seconds
        .unwrap_or(DEFAULT_RESET_SECS);
    if reset_secs == 0 {
        return Err(LoadError::invalid(
            "backoff.default_reset_seconds",
            "must be greater than zero",
        ));
    }

    Ok(BackoffSettings {
        share_via_cache: backoff.share_via_cache.unwrap_or(true),
        soft_remain,
        hard_remain,
        key,
        jitter_ms,
        clock_skew_ms,
        raise_on_success: backoff.raise_on_success.unwrap_or(true),
        default_reset: Duration::from_secs(reset_secs),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let version = cache
        .version
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_CACHE_VERSION.to_string());
    if version.is_empty() || version.contains(':') {
        return Err(LoadError::invalid(
            "cache.version",
            "must be non-empty and contain no `:`",
        ));
    }

    let fresh = non_zero_secs(
        cache
            .character_fresh_seconds
            .unwrap_or(DEFAULT_CHARACTER_FRESH_SECS),
        "cache.character_fresh_seconds",
    )?;
    let lock_ttl = non_zero_secs(
        cache.lock_ttl_seconds.unwrap_or(DEFAULT_LOCK_TTL_SECS),
        "cache.lock_ttl_seconds",
    )?;
    let min_payload_ttl = non_zero_secs(
        cache
            .min_payload_ttl_seconds
            .unwrap_or(DEFAULT_MIN_PAYLOAD_TTL_SECS),
        "cache.min_payload_ttl_seconds",
    )?;

    Ok(CacheSettings {
        version,
        character_fresh: fresh,
        lock_ttl,
        min_payload_ttl,
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
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRedisSettings {
    url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUpstreamSettings {
    base_url: Option<String>,
    compatibility_date: Option<String>,
    accept_language: Option<String>,
    timeout_seconds: Option<u64>,
    fallback_ttl_seconds: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBackoffSettings {
    share_via_cache: Option<bool>,
    soft_remain: Option<u32>,
    hard_remain: Option<u32>,
    key: Option<String>,
    jitter_ms: Option<u64>,
    clock_skew_ms: Option<u64>,
    raise_on_success: Option<bool>,
    default_reset_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    version: Option<String>,
    character_fresh_seconds: Option<u64>,
    lock_ttl_seconds: Option<u64>,
    min_payload_ttl_seconds: Option<u64>,
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

fn non_zero_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

/// Two letters, optionally followed by `-` and two more (`en`, `de-DE`).
fn is_language_tag(value: &str) -> bool {
    let bytes = value.as_bytes();
    let letters = |part: &[u8]| part.len() == 2 && part.iter().all(u8::is_ascii_alphabetic);
    match bytes.len() {
        2 => letters(bytes),
        5 => letters(&bytes[..2]) && bytes[2] == b'-' && letters(&bytes[3..]),
        _ => false,
    }
}

fn mask_credentials(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("****"));
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) => "<unparseable>".to_string(),
    }
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
