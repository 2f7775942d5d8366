use super::*;

#[test]
fn defaults_resolve_without_any_source() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert_eq!(settings.logging.format, LogFormat::Compact);
    assert!(settings.database.url.is_none());
    assert_eq!(settings.database.connect_attempts.get(), 2);
    assert_eq!(settings.database.store_timeout, Duration::from_secs(5));
    assert_eq!(settings.cache.capacity.get(), 1024);
    assert_eq!(settings.ingest.max_in_flight.get(), 16);
    assert_eq!(settings.ingest.max_payload_bytes.get(), 1024 * 1024);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.cache.capacity = Some(10);

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        cache_capacity: Some(2),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.cache.capacity.get(), 2);
}

#[test]
fn database_url_is_trimmed_and_blank_means_absent() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());

    let mut raw = RawSettings::default();
    raw.apply_warmup_check_overrides(&WarmupCheckArgs {
        database: DatabaseOverride {
            database_url: Some(" postgres://localhost/orders ".to_string()),
        },
        cache_capacity: Some(8),
    });
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.database.url.as_deref(),
        Some("postgres://localhost/orders")
    );
    assert_eq!(settings.cache.capacity.get(), 8);
}

#[test]
fn zero_cache_capacity_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.capacity = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero capacity");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.capacity",
            ..
        }
    ));
}

#[test]
fn zero_store_timeout_is_rejected() {
    let mut raw = RawSettings::default();
    raw.database.store_timeout_millis = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero timeout");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "database.store_timeout_millis",
            ..
        }
    ));
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "logging.level",
            ..
        })
    ));
}

#[test]
fn json_logging_toggle() {
    let mut raw = RawSettings::default();
    raw.apply_serve_overrides(&ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.logging.format, LogFormat::Json);
}

#[test]
fn non_zero_u32_rejects_out_of_range() {
    assert!(non_zero_u32(u64::from(u32::MAX) + 1, "test.key").is_err());
    assert_eq!(non_zero_u32(7, "test.key").expect("in range").get(), 7);
}

#[test]
fn cli_parses_warmup_check() {
    let args = CliArgs::try_parse_from([
        "orderline",
        "warmup-check",
        "--database-url",
        "postgres://db/orders",
    ])
    .expect("valid arguments");

    match args.command {
        Some(Command::WarmupCheck(check)) => {
            assert_eq!(
                check.database.database_url.as_deref(),
                Some("postgres://db/orders")
            );
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn nats_defaults_and_overrides() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    assert!(settings.nats.url.is_none());
    assert_eq!(settings.nats.stream, "ORDERS");
    assert_eq!(settings.nats.subject, "orders.created");
    assert_eq!(settings.nats.consumer, "orderline");
    assert_eq!(settings.ingest.ack_wait, Duration::from_secs(5));

    let mut raw = RawSettings::default();
    raw.apply_serve_overrides(&ServeOverrides {
        nats_url: Some(" nats://broker:4222 ".to_string()),
        ingest_ack_wait_millis: Some(250),
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.nats.url.as_deref(), Some("nats://broker:4222"));
    assert_eq!(settings.ingest.ack_wait, Duration::from_millis(250));
}

#[test]
fn blank_nats_subject_and_zero_ack_wait_are_rejected() {
    let mut raw = RawSettings::default();
    raw.nats.subject = Some("  ".to_string());
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "nats.subject",
            ..
        })
    ));

    let mut raw = RawSettings::default();
    raw.ingest.ack_wait_millis = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "ingest.ack_wait_millis",
            ..
        })
    ));
}
