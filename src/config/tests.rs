use serial_test::serial;

use super::*;

#[test]
fn defaults_match_the_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.to_string(), "127.0.0.1:3000");
    assert_eq!(settings.redis.url.as_str(), "redis://127.0.0.1:6379/0");
    assert_eq!(settings.upstream.base_url.as_str(), "https://esi.evetech.net/");
    assert_eq!(settings.upstream.compatibility_date, "2025-09-30");
    assert_eq!(settings.upstream.accept_language, "en");
    assert_eq!(settings.upstream.fallback_ttl, Duration::from_secs(86_400));
    assert!(settings.upstream.user_agent.starts_with("esi-gateway/"));
    assert!(settings.backoff.share_via_cache);
    assert_eq!(settings.backoff.soft_remain, 5);
    assert_eq!(settings.backoff.hard_remain, 1);
    assert_eq!(settings.backoff.key, "esi:cooldown-until");
    assert_eq!(settings.cache.version, "v1");
    assert_eq!(settings.cache.character_fresh, Duration::from_secs(600));
    assert_eq!(settings.cache.lock_ttl, Duration::from_secs(15));
    assert!(settings.database.url.is_none());

    let policy = settings.character_cache_policy();
    assert_eq!(policy.fresh, Duration::from_secs(600));
    assert_eq!(policy.fallback_ttl, Duration::from_secs(86_400));
    assert_eq!(settings.backoff_policy(), BackoffPolicy::default());
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        cache_version: Some("v7".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.cache.version, "v7");
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
fn hard_threshold_may_not_exceed_soft() {
    let mut raw = RawSettings::default();
    raw.backoff.soft_remain = Some(3);
    raw.backoff.hard_remain = Some(4);

    let err = Settings::from_raw(raw).expect_err("hard above soft");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "backoff.hard_remain",
            ..
        }
    ));
}

#[test]
fn remain_thresholds_are_bounded() {
    let mut raw = RawSettings::default();
    raw.backoff.soft_remain = Some(101);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.backoff.hard_remain = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn jitter_and_skew_are_capped() {
    let mut raw = RawSettings::default();
    raw.backoff.jitter_ms = Some(2_001);
    let err = Settings::from_raw(raw).expect_err("jitter too large");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "backoff.jitter_ms",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.backoff.clock_skew_ms = Some(2_000);
    raw.backoff.jitter_ms = Some(0);
    assert!(Settings::from_raw(raw).is_ok());
}

#[test]
fn accept_language_must_be_a_short_tag() {
    for good in ["en", "de", "en-US", "zh-cn"] {
        let mut raw = RawSettings::default();
        raw.upstream.accept_language = Some(good.to_string());
        assert!(Settings::from_raw(raw).is_ok(), "{good} should be accepted");
    }

    for bad in ["", "e", "english", "en_US", "en-USA", "e1"] {
        let mut raw = RawSettings::default();
        raw.upstream.accept_language = Some(bad.to_string());
        assert!(Settings::from_raw(raw).is_err(), "{bad} should be rejected");
    }
}

#[test]
fn compatibility_date_must_be_a_calendar_date() {
    let mut raw = RawSettings::default();
    raw.upstream.compatibility_date = Some("2025-13-01".to_string());
    let err = Settings::from_raw(raw).expect_err("invalid month");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "upstream.compatibility_date",
            ..
        }
    ));
}

#[test]
fn freshness_window_may_not_outlive_the_fallback_ttl() {
    let mut raw = RawSettings::default();
    raw.upstream.fallback_ttl_seconds = Some(300);
    raw.cache.character_fresh_seconds = Some(600);

    let err = Settings::from_raw(raw).expect_err("fresh above fallback");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.character_fresh_seconds",
            ..
        }
    ));
}

#[test]
fn redis_url_requires_redis_scheme() {
    let mut raw = RawSettings::default();
    raw.redis.url = Some("http://127.0.0.1:6379".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn summary_masks_credentials() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("postgres://gateway:hunter2@db/esi".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");

    let summary = settings.summary();
    let (_, database) = summary
        .iter()
        .find(|(key, _)| *key == "database.url")
        .expect("database entry");
    assert!(!database.contains("hunter2"));
    assert!(database.contains("****"));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["esi-gateway"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_check_config_arguments() {
    let args = CliArgs::parse_from([
        "esi-gateway",
        "check-config",
        "--backoff-share-via-cache",
        "false",
        "--upstream-accept-language",
        "de",
    ]);

    match args.command.expect("check-config command") {
        Command::CheckConfig(args) => {
            assert_eq!(args.overrides.backoff_share_via_cache, Some(false));
            assert_eq!(
                args.overrides.upstream_accept_language.as_deref(),
                Some("de")
            );
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
#[serial]
fn environment_overrides_file_defaults() {
    // SAFETY: serialized with every other test that touches the process environment.
    unsafe {
        std::env::set_var("ESI_GATEWAY__CACHE__VERSION", "v9");
    }
    let result = load(&CliArgs::parse_from(["esi-gateway"]));
    unsafe {
        std::env::remove_var("ESI_GATEWAY__CACHE__VERSION");
    }

    let settings = result.expect("valid settings");
    assert_eq!(settings.cache.version, "v9");
}

#[test]
#[serial]
fn cli_beats_environment() {
    unsafe {
        std::env::set_var("ESI_GATEWAY__CACHE__VERSION", "v9");
    }
    let result = load(&CliArgs::parse_from([
        "esi-gateway",
        "serve",
        "--cache-version",
        "v10",
    ]));
    unsafe {
        std::env::remove_var("ESI_GATEWAY__CACHE__VERSION");
    }

    assert_eq!(result.expect("valid settings").cache.version, "v10");
}
