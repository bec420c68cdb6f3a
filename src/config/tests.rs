use super::*;

#[test]
fn defaults_resolve_to_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.to_string(), "127.0.0.1:3000");
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert!(settings.database.url.is_none());
    assert_eq!(settings.database.max_connections.get(), 8);
    assert!(settings.search.elasticsearch_url.is_none());
    assert_eq!(settings.search.index, "posts");
    assert_eq!(settings.feed.capacity.get(), 100);
    assert_eq!(settings.feed.preview_chars.get(), 200);
    assert_eq!(settings.feed.rebuild_limit.get(), 50);
    assert_eq!(settings.feed.cas_max_retries.get(), 16);
    assert_eq!(settings.likes.ttl, Duration::from_secs(3600));
    assert_eq!(settings.likes.cache_capacity.get(), 10_000);
    assert_eq!(settings.timeouts.post_store, Duration::from_millis(2000));
    assert_eq!(settings.timeouts.search, Duration::from_millis(1000));
    assert_eq!(settings.timeouts.directory, Duration::from_millis(500));
    assert_eq!(settings.timeouts.cache, Duration::from_millis(250));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.feed.capacity = Some(80);

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        feed_capacity: Some(120),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.feed.capacity.get(), 120);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_values_are_rejected_with_their_key() {
    let mut raw = RawSettings::default();
    raw.likes.ttl_seconds = Some(0);
    let err = Settings::from_raw(raw).expect_err("zero ttl");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "likes.ttl_seconds",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.timeouts.cache_ms = Some(0);
    let err = Settings::from_raw(raw).expect_err("zero timeout");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "timeouts.cache_ms",
            ..
        }
    ));
}

#[test]
fn rebuild_limit_cannot_exceed_capacity() {
    let mut raw = RawSettings::default();
    raw.feed.capacity = Some(10);
    raw.feed.rebuild_limit = Some(11);

    let err = Settings::from_raw(raw).expect_err("limit above capacity");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "feed.rebuild_limit",
            ..
        }
    ));
}

#[test]
fn blank_urls_mean_in_memory_backends() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".into());
    raw.search.elasticsearch_url = Some(String::new());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
    assert!(settings.search.elasticsearch_url.is_none());
}

#[test]
fn elasticsearch_url_must_be_http() {
    let mut raw = RawSettings::default();
    raw.search.elasticsearch_url = Some("localhost:9200".into());

    let err = Settings::from_raw(raw).expect_err("scheme required");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "search.elasticsearch_url",
            ..
        }
    ));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["microfeed"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "microfeed",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--database-url",
        "postgres://override",
        "--likes-ttl-seconds",
        "60",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.database_url.as_deref(),
                Some("postgres://override")
            );
            assert_eq!(serve.overrides.likes_ttl_seconds, Some(60));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_check_config() {
    let args = CliArgs::parse_from(["microfeed", "check-config"]);
    assert!(matches!(args.command, Some(Command::CheckConfig)));
}

#[test]
fn file_defaults_agree_with_service_defaults() {
    use crate::application::repos::CallTimeouts;
    use crate::cache::{FeedCacheConfig, LikesCacheConfig};

    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    let feed = FeedCacheConfig::from(&settings);
    let feed_default = FeedCacheConfig::default();
    assert_eq!(feed.capacity, feed_default.capacity);
    assert_eq!(feed.cas_max_retries, feed_default.cas_max_retries);
    assert_eq!(feed.call_timeout, feed_default.call_timeout);

    let likes = LikesCacheConfig::from(&settings);
    let likes_default = LikesCacheConfig::default();
    assert_eq!(likes.ttl, likes_default.ttl);
    assert_eq!(likes.capacity, likes_default.capacity);

    assert_eq!(CallTimeouts::from(&settings.timeouts), CallTimeouts::default());
}
