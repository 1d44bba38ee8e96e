use super::validation::validate_config;
use super::*;
use serial_test::serial;
use std::fs;
use tempfile::tempdir;

fn with_xdg_config_home<T>(dir: &Path, f: impl FnOnce() -> T) -> T {
    let original = std::env::var("XDG_CONFIG_HOME").ok();
    unsafe {
        std::env::set_var("XDG_CONFIG_HOME", dir);
    }
    let result = f();
    unsafe {
        match original {
            Some(val) => std::env::set_var("XDG_CONFIG_HOME", val),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }
    }
    result
}

#[test]
#[serial]
fn test_config_load_default_creation() {
    crate::logger::Log::set_enabled(false);
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("wearlux").join("wearlux.toml");

    let result = with_xdg_config_home(temp_dir.path(), Config::load);
    crate::logger::Log::set_enabled(true);

    let config = result.unwrap();
    assert!(config_path.exists());
    assert_eq!(config.daynight_source(), DayNightSource::Location);
    assert_eq!(config.sun_angles(), SunAngles::default());
    assert_eq!(config.preferences_file.as_deref(), Some("levels.toml"));
}

#[test]
#[serial]
fn test_default_config_file_round_trips() {
    crate::logger::Log::set_enabled(false);
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("wearlux.toml");
    create_default_config(&path).unwrap();
    crate::logger::Log::set_enabled(true);

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("#[Day/night]"));
    assert!(content.contains("daynight_source = \"location\""));

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.sampler_settings(), SamplerSettings::default());
    let cycle = config.cycle_settings();
    assert_eq!(cycle.signal_timeout, None);
    assert_eq!(cycle.retry.max_retries, 0);
    assert_eq!(
        cycle.retry.base_backoff,
        Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS)
    );
    assert_eq!(
        config.detection_interval(),
        Duration::from_millis(DEFAULT_DETECTION_INTERVAL_MS)
    );
}

#[test]
fn test_load_from_missing_path_is_error() {
    let temp_dir = tempdir().unwrap();
    let err = load_from_path(&temp_dir.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_load_full_config() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("wearlux.toml");
    fs::write(
        &path,
        r#"
daynight_source = "ambient_light"
sunrise_angle = 10.0
sunset_angle = -6.0
timezone = "Asia/Kolkata"
latitude = 19.076
longitude = 72.8777
value_delay_ms = 4000
min_screen_time_ms = 8000
daylight_lux_high = 500.0
daylight_lux_low = 100.0
signal_timeout_ms = 30000
connect_retries = 3
retry_backoff_ms = 250
preferences_file = "/etc/wearlux/levels.toml"
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.daynight_source(), DayNightSource::AmbientLight);
    assert_eq!(
        config.sun_angles(),
        SunAngles {
            sunrise: 10.0,
            sunset: -6.0
        }
    );
    assert_eq!(config.timezone().unwrap(), Some(chrono_tz::Asia::Kolkata));
    assert_eq!(
        config.sampler_settings().value_delay,
        Duration::from_millis(4000)
    );

    let cycle = config.cycle_settings();
    assert_eq!(cycle.signal_timeout, Some(Duration::from_secs(30)));
    assert_eq!(cycle.retry.max_retries, 3);
    assert_eq!(cycle.retry.base_backoff, Duration::from_millis(250));

    assert_eq!(
        config.preferences_path(temp_dir.path()),
        PathBuf::from("/etc/wearlux/levels.toml")
    );
    let fix = config.fallback_location(Local::now()).unwrap();
    assert_eq!(fix.latitude, 19.076);
}

#[test]
fn test_relative_preferences_path_resolves_against_config_dir() {
    let config = Config::default();
    assert_eq!(
        config.preferences_path(Path::new("/home/me/.config/wearlux")),
        PathBuf::from("/home/me/.config/wearlux/levels.toml")
    );
}

#[test]
fn test_parse_error_mentions_file() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("wearlux.toml");
    fs::write(&path, "daynight_source = \"moonlight\"\n").unwrap();
    let err = load_from_path(&path).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config"));
}

#[test]
fn test_validation_accepts_defaults() {
    assert!(validate_config(&Config::default()).is_ok());
}

#[test]
fn test_validation_rejects_bad_coordinates() {
    let config = Config {
        latitude: Some(91.0),
        longitude: Some(0.0),
        ..Default::default()
    };
    assert!(validate_config(&config).is_err());

    let config = Config {
        latitude: Some(10.0),
        longitude: Some(-181.0),
        ..Default::default()
    };
    assert!(validate_config(&config).is_err());

    let config = Config {
        latitude: Some(10.0),
        ..Default::default()
    };
    assert!(validate_config(&config).is_err());
}

#[test]
fn test_validation_sun_angle_limits() {
    let config = Config {
        sunrise_angle: Some(MINIMUM_SUN_ANGLE),
        sunset_angle: Some(MAXIMUM_SUN_ANGLE),
        ..Default::default()
    };
    assert!(validate_config(&config).is_ok());

    let config = Config {
        sunset_angle: Some(-20.0),
        ..Default::default()
    };
    let err = validate_config(&config).unwrap_err();
    assert!(err.to_string().contains("sunset_angle"));
}

#[test]
fn test_validation_rejects_unknown_timezone() {
    let config = Config {
        timezone: Some("Mars/Olympus_Mons".to_string()),
        ..Default::default()
    };
    let err = validate_config(&config).unwrap_err();
    assert!(err.to_string().contains("Unknown timezone"));
}

#[test]
fn test_validation_sampler_timing() {
    let config = Config {
        value_delay_ms: Some(0),
        ..Default::default()
    };
    assert!(validate_config(&config).is_err());

    let config = Config {
        value_delay_ms: Some(8000),
        min_screen_time_ms: Some(3000),
        ..Default::default()
    };
    assert!(validate_config(&config).is_err());

    let config = Config {
        value_delay_ms: Some(8000),
        min_screen_time_ms: Some(4000),
        ..Default::default()
    };
    assert!(validate_config(&config).is_ok());
}

#[test]
fn test_validation_lux_thresholds() {
    let config = Config {
        daylight_lux_high: Some(100.0),
        daylight_lux_low: Some(200.0),
        ..Default::default()
    };
    assert!(validate_config(&config).is_err());

    let config = Config {
        daylight_lux_high: Some(f32::NAN),
        ..Default::default()
    };
    assert!(validate_config(&config).is_err());

    let config = Config {
        daylight_lux_high: Some(300.0),
        daylight_lux_low: Some(300.0),
        ..Default::default()
    };
    assert!(validate_config(&config).is_ok());
}

#[test]
fn test_validation_retry_limits() {
    let config = Config {
        connect_retries: Some(MAXIMUM_CONNECT_RETRIES),
        ..Default::default()
    };
    assert!(validate_config(&config).is_ok());

    let config = Config {
        connect_retries: Some(MAXIMUM_CONNECT_RETRIES + 1),
        ..Default::default()
    };
    assert!(validate_config(&config).is_err());

    let config = Config {
        retry_backoff_ms: Some(MAXIMUM_RETRY_BACKOFF_MS + 1),
        ..Default::default()
    };
    assert!(validate_config(&config).is_err());
}

#[test]
fn test_zero_timeout_disables_deadline() {
    let config = Config {
        signal_timeout_ms: Some(0),
        ..Default::default()
    };
    assert_eq!(config.cycle_settings().signal_timeout, None);
    assert!(
        validate_config(&Config {
            detection_interval_ms: Some(0),
            ..Default::default()
        })
        .is_err()
    );
}

#[test]
fn test_source_selects_its_own_signal() {
    let now = Local::now();
    let fix = LocationFix::new(51.5, -0.12, now);
    let light = Some(LightSample::new(5.0, now));

    assert!(matches!(
        DayNightSource::Location.select(fix, light),
        Some(Corroborator::Location(_))
    ));
    assert_eq!(DayNightSource::Location.select(None, light), None);
    assert!(matches!(
        DayNightSource::AmbientLight.select(fix, light),
        Some(Corroborator::AmbientLight(_))
    ));
    assert_eq!(DayNightSource::AmbientLight.select(fix, None), None);
}
