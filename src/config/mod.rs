//! Configuration layer: typed settings with layered precedence (file → env → CLI).

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

mod cli;

use crate::application::{fanout, feed, repos};
use crate::cache;
use crate::domain::posts;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "microfeed";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u64 = 8;
const DEFAULT_SEARCH_INDEX: &str = "posts";
const DEFAULT_FEED_CAPACITY: u64 = cache::DEFAULT_FEED_CAPACITY as u64;
const DEFAULT_PREVIEW_CHARS: u64 = posts::DEFAULT_PREVIEW_CHARS as u64;
const DEFAULT_REBUILD_LIMIT: u64 = feed::DEFAULT_REBUILD_LIMIT as u64;
const DEFAULT_CAS_MAX_RETRIES: u64 = cache::DEFAULT_CAS_MAX_RETRIES as u64;
const DEFAULT_FANOUT_CONCURRENCY: u64 = fanout::DEFAULT_FANOUT_CONCURRENCY as u64;
const DEFAULT_LIKES_TTL_SECS: u64 = cache::DEFAULT_LIKE_TTL.as_secs();
const DEFAULT_LIKES_CACHE_CAPACITY: u64 = cache::DEFAULT_LIKE_CACHE_CAPACITY as u64;
const DEFAULT_POST_STORE_TIMEOUT_MS: u64 = repos::DEFAULT_POST_STORE_TIMEOUT.as_millis() as u64;
const DEFAULT_SEARCH_TIMEOUT_MS: u64 = repos::DEFAULT_SEARCH_TIMEOUT.as_millis() as u64;
const DEFAULT_DIRECTORY_TIMEOUT_MS: u64 = repos::DEFAULT_DIRECTORY_TIMEOUT.as_millis() as u64;
const DEFAULT_CACHE_TIMEOUT_MS: u64 = repos::DEFAULT_CACHE_TIMEOUT.as_millis() as u64;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub search: SearchSettings,
    pub feed: FeedSettings,
    pub likes: LikesSettings,
    pub timeouts: TimeoutSettings,
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
    /// `None` keeps posts in process memory.
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// `None` uses the in-process index.
    pub elasticsearch_url: Option<String>,
    pub index: String,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub capacity: NonZeroUsize,
    pub preview_chars: NonZeroUsize,
    pub rebuild_limit: NonZeroUsize,
    pub cas_max_retries: NonZeroU32,
    pub fanout_concurrency: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct LikesSettings {
    pub ttl: Duration,
    pub cache_capacity: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct TimeoutSettings {
    pub post_store: Duration,
    pub search: Duration,
    pub directory: Duration,
    pub cache: Duration,
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

    builder = builder.add_source(Environment::with_prefix("MICROFEED").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::CheckConfig) | None => {}
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
    search: RawSearchSettings,
    feed: RawFeedSettings,
    likes: RawLikesSettings,
    timeouts: RawTimeoutSettings,
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
            self.database.max_connections = Some(max.into());
        }
        if let Some(url) = overrides.elasticsearch_url.as_ref() {
            self.search.elasticsearch_url = Some(url.clone());
        }
        if let Some(index) = overrides.search_index.as_ref() {
            self.search.index = Some(index.clone());
        }
        if let Some(capacity) = overrides.feed_capacity {
            self.feed.capacity = Some(capacity as u64);
        }
        if let Some(limit) = overrides.feed_rebuild_limit {
            self.feed.rebuild_limit = Some(limit as u64);
        }
        if let Some(concurrency) = overrides.feed_fanout_concurrency {
            self.feed.fanout_concurrency = Some(concurrency as u64);
        }
        if let Some(ttl) = overrides.likes_ttl_seconds {
            self.likes.ttl_seconds = Some(ttl);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            search,
            feed,
            likes,
            timeouts,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            search: build_search_settings(search)?,
            feed: build_feed_settings(feed)?,
            likes: build_likes_settings(likes)?,
            timeouts: build_timeout_settings(timeouts)?,
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
    let url = non_blank(database.url);
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_search_settings(search: RawSearchSettings) -> Result<SearchSettings, LoadError> {
    let elasticsearch_url = non_blank(search.elasticsearch_url);
    if let Some(url) = elasticsearch_url.as_deref()
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        return Err(LoadError::invalid(
            "search.elasticsearch_url",
            format!("`{url}` is not an http(s) URL"),
        ));
    }

    let index = non_blank(search.index).unwrap_or_else(|| DEFAULT_SEARCH_INDEX.to_string());

    Ok(SearchSettings {
        elasticsearch_url,
        index,
    })
}

fn build_feed_settings(feed: RawFeedSettings) -> Result<FeedSettings, LoadError> {
    let capacity = non_zero_usize(
        feed.capacity.unwrap_or(DEFAULT_FEED_CAPACITY),
        "feed.capacity",
    )?;
    let preview_chars = non_zero_usize(
        feed.preview_chars.unwrap_or(DEFAULT_PREVIEW_CHARS),
        "feed.preview_chars",
    )?;
    let rebuild_limit = non_zero_usize(
        feed.rebuild_limit.unwrap_or(DEFAULT_REBUILD_LIMIT),
        "feed.rebuild_limit",
    )?;
    if rebuild_limit > capacity {
        return Err(LoadError::invalid(
            "feed.rebuild_limit",
            format!("must not exceed feed.capacity ({capacity})"),
        ));
    }
    let cas_max_retries = non_zero_u32(
        feed.cas_max_retries.unwrap_or(DEFAULT_CAS_MAX_RETRIES),
        "feed.cas_max_retries",
    )?;
    let fanout_concurrency = non_zero_usize(
        feed.fanout_concurrency
            .unwrap_or(DEFAULT_FANOUT_CONCURRENCY),
        "feed.fanout_concurrency",
    )?;

    Ok(FeedSettings {
        capacity,
        preview_chars,
        rebuild_limit,
        cas_max_retries,
        fanout_concurrency,
    })
}

fn build_likes_settings(likes: RawLikesSettings) -> Result<LikesSettings, LoadError> {
    let ttl_seconds = likes.ttl_seconds.unwrap_or(DEFAULT_LIKES_TTL_SECS);
    if ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "likes.ttl_seconds",
            "must be greater than zero",
        ));
    }
    let cache_capacity = non_zero_usize(
        likes
            .cache_capacity
            .unwrap_or(DEFAULT_LIKES_CACHE_CAPACITY),
        "likes.cache_capacity",
    )?;

    Ok(LikesSettings {
        ttl: Duration::from_secs(ttl_seconds),
        cache_capacity,
    })
}

fn build_timeout_settings(timeouts: RawTimeoutSettings) -> Result<TimeoutSettings, LoadError> {
    Ok(TimeoutSettings {
        post_store: millis(
            timeouts.post_store_ms,
            DEFAULT_POST_STORE_TIMEOUT_MS,
            "timeouts.post_store_ms",
        )?,
        search: millis(
            timeouts.search_ms,
            DEFAULT_SEARCH_TIMEOUT_MS,
            "timeouts.search_ms",
        )?,
        directory: millis(
            timeouts.directory_ms,
            DEFAULT_DIRECTORY_TIMEOUT_MS,
            "timeouts.directory_ms",
        )?,
        cache: millis(
            timeouts.cache_ms,
            DEFAULT_CACHE_TIMEOUT_MS,
            "timeouts.cache_ms",
        )?,
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
    max_connections: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSearchSettings {
    elasticsearch_url: Option<String>,
    index: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFeedSettings {
    capacity: Option<u64>,
    preview_chars: Option<u64>,
    rebuild_limit: Option<u64>,
    cas_max_retries: Option<u64>,
    fanout_concurrency: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLikesSettings {
    ttl_seconds: Option<u64>,
    cache_capacity: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTimeoutSettings {
    post_store_ms: Option<u64>,
    search_ms: Option<u64>,
    directory_ms: Option<u64>,
    cache_ms: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
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

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn millis(value: Option<u64>, default: u64, key: &'static str) -> Result<Duration, LoadError> {
    match value.unwrap_or(default) {
        0 => Err(LoadError::invalid(key, "must be greater than zero")),
        ms => Ok(Duration::from_millis(ms)),
    }
}

#[cfg(test)]
mod tests;
