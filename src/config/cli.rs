use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the microfeed binary.
#[derive(Debug, Parser)]
#[command(name = "microfeed", version, about = "Feed fan-out and cache service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "MICROFEED_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Resolve and validate configuration, then exit.
    #[command(name = "check-config")]
    CheckConfig,
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

    /// Override the post store connection URL. Without one posts live in memory.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the post store pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the Elasticsearch base URL. Without one the index lives in memory.
    #[arg(long = "search-elasticsearch-url", value_name = "URL")]
    pub elasticsearch_url: Option<String>,

    /// Override the Elasticsearch index name.
    #[arg(long = "search-index", value_name = "NAME")]
    pub search_index: Option<String>,

    /// Override the per-viewer feed capacity.
    #[arg(long = "feed-capacity", value_name = "COUNT")]
    pub feed_capacity: Option<usize>,

    /// Override how many recent posts a feed rebuild reads.
    #[arg(long = "feed-rebuild-limit", value_name = "COUNT")]
    pub feed_rebuild_limit: Option<usize>,

    /// Override how many follower feeds are written concurrently per publish.
    #[arg(long = "feed-fanout-concurrency", value_name = "COUNT")]
    pub feed_fanout_concurrency: Option<usize>,

    /// Override the like-count cache time-to-live.
    #[arg(long = "likes-ttl-seconds", value_name = "SECONDS")]
    pub likes_ttl_seconds: Option<u64>,
}
