//! Main application entry point and high-level flow coordination.
//!
//! Parses the command line, then hands off to one of three flows:
//!
//! - `run`: the daemon. Host events arrive as JSON lines on stdin, brightness
//!   messages and activity update requests leave as JSON lines on stdout, and
//!   all logging moves to stderr (or a file with `--log`).
//! - `decide`: one decision cycle from explicit signals, printing the message.
//! - `solar`: the daytime window for a location, for checking sun angles.
//! - `receive`: the paired display's side, turning message lines on stdin
//!   into device brightness values on stdout.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;

use wearlux::activity::{ActivityType, DetectedActivity};
use wearlux::args::{self, CliAction, ParsedArgs};
use wearlux::brightness::{LevelScale, ReceiverMode, receive_line};
use wearlux::channel::{JsonLineChannel, TransmissionChannel};
use wearlux::config::{self, Config, DayNightSource};
use wearlux::constants::{EXIT_FAILURE, EXIT_SUCCESS};
use wearlux::engine::{CycleOutcome, DecisionContext, SignalSlots, run_cycle};
use wearlux::events::{RequestLineRecognizer, spawn_reader};
use wearlux::geo::log_solar_window;
use wearlux::logger::{Log, Target};
use wearlux::preferences::TomlPreferenceStore;
use wearlux::service::Service;
use wearlux::signal::{LightSample, LocationFix};
use wearlux::signals::setup_signal_handler;
use wearlux::time_source::{self, ManualTimeSource, RealTimeSource, TimeSource};
use wearlux::{
    log_block_start, log_debug, log_end, log_error, log_indented, log_pipe, log_version,
    log_warning,
};

fn main() {
    let parsed_args = ParsedArgs::from_env();

    let result = match parsed_args.action {
        CliAction::ShowVersion => {
            args::display_version_info();
            Ok(())
        }
        CliAction::ShowHelp => {
            args::display_help();
            Ok(())
        }
        CliAction::ShowHelpDueToError => {
            args::display_help();
            std::process::exit(EXIT_FAILURE);
        }
        CliAction::Run {
            debug_enabled,
            config_dir,
            log_file,
        } => run_daemon(debug_enabled, config_dir, log_file),
        CliAction::Decide {
            debug_enabled,
            config_dir,
            activity,
            latitude,
            longitude,
            lux,
            at,
        } => decide(
            debug_enabled,
            config_dir,
            &activity,
            latitude.zip(longitude),
            lux,
            at.as_deref(),
        ),
        CliAction::Solar {
            debug_enabled,
            config_dir,
            latitude,
            longitude,
            date,
        } => solar(debug_enabled, config_dir, latitude, longitude, date.as_deref()),
        CliAction::Receive {
            debug_enabled,
            scale,
            automatic,
        } => receive(debug_enabled, scale, automatic),
    };

    match result {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(e) => {
            log_pipe!();
            log_error!("{:#}", e);
            log_end!();
            std::process::exit(EXIT_FAILURE);
        }
    }
}

/// Load the configuration and the level table next to it.
fn load_configuration(config_dir: Option<String>) -> Result<(Config, TomlPreferenceStore)> {
    config::set_config_dir(config_dir)?;
    let config = Config::load()?;
    let config_path = config::get_config_path()?;
    config.log_config(&config_path);

    let dir = config::config_dir()?;
    let preferences_path = config.preferences_path(&dir);
    let store = TomlPreferenceStore::load(&preferences_path)?;
    log_indented!(
        "Level table: {} ({} entries)",
        preferences_path.display(),
        store.len()
    );
    Ok((config, store))
}

fn run_daemon(
    debug_enabled: bool,
    config_dir: Option<String>,
    log_file: Option<String>,
) -> Result<()> {
    // stdout carries the outgoing messages
    Log::set_target(Target::Stderr);
    Log::set_debug(debug_enabled);
    let _log_guard = match log_file {
        Some(path) => Some(
            Log::start_file_logging(path.clone())
                .with_context(|| format!("Failed to start logging to {path}"))?,
        ),
        None => None,
    };

    log_version!();
    let (config, store) = load_configuration(config_dir)?;

    let clock: Arc<dyn TimeSource> = Arc::new(RealTimeSource);
    time_source::init_time_source(Arc::clone(&clock));

    let signal_state = setup_signal_handler()?;
    let mut service = Service::new(
        &config,
        Arc::new(store),
        clock,
        Box::new(|| Box::new(JsonLineChannel::new(io::stdout())) as Box<dyn TransmissionChannel>),
    )?;

    let mut recognizer = RequestLineRecognizer::new(io::stdout());
    service.start(&mut recognizer)?;
    spawn_reader(BufReader::new(io::stdin()), service.sender())?;

    service.run(&signal_state.running)?;

    let summary = service.shutdown();
    log_block_start!("Shutting down");
    log_indented!(
        "{} decision cycles, {} messages sent",
        summary.finished,
        summary.sent
    );
    log_end!();
    Ok(())
}

fn decide(
    debug_enabled: bool,
    config_dir: Option<String>,
    activity: &str,
    coordinates: Option<(f64, f64)>,
    lux: Option<f32>,
    at: Option<&str>,
) -> Result<()> {
    Log::set_target(Target::Stderr);
    Log::set_debug(debug_enabled);
    log_version!();

    let activity: ActivityType = activity.parse()?;
    let clock: Arc<dyn TimeSource> = match at {
        Some(at) => {
            let start = time_source::parse_datetime(at).map_err(|e| anyhow::anyhow!(e))?;
            Arc::new(ManualTimeSource::new(start))
        }
        None => Arc::new(RealTimeSource),
    };
    time_source::init_time_source(Arc::clone(&clock));
    let now = clock.now();

    let (config, store) = load_configuration(config_dir)?;

    let source = config.daynight_source();
    let location = match coordinates {
        Some((lat, lon)) => Some(
            LocationFix::new(lat, lon, now)
                .with_context(|| format!("Location out of range: {lat}, {lon}"))?,
        ),
        None => config.fallback_location(now),
    };
    let light = lux.map(|lux| LightSample::new(lux, now));

    let ignored = match source {
        DayNightSource::Location if lux.is_some() => Some("--lux"),
        DayNightSource::AmbientLight if coordinates.is_some() => Some("--lat/--lon"),
        _ => None,
    };
    if let Some(flag) = ignored {
        log_pipe!();
        log_warning!("{} is ignored in {} mode", flag, source.as_str());
    }

    let corroborator = source.select(location, light);
    if corroborator.is_none() {
        log_pipe!();
        log_warning!("No {} signal given, deciding as daytime", source.as_str());
    }

    let context = Arc::new(DecisionContext::from_config(&config, Arc::new(store), clock)?);
    let seed = SignalSlots {
        activity: Some(DetectedActivity::new(activity, 100, now)),
        corroborator,
    };

    let outcome = run_cycle(
        context,
        Box::new(JsonLineChannel::new(io::stdout())),
        seed,
        config.cycle_settings(),
    );
    log_outcome(&outcome);

    if outcome.sent.is_none() {
        anyhow::bail!("No brightness message was sent");
    }
    Ok(())
}

fn log_outcome(outcome: &CycleOutcome) {
    log_block_start!("Decision");
    match outcome.decision {
        Some(decision) => {
            log_indented!("Activity: {}", decision.activity);
            log_indented!("Period: {}", decision.period);
            log_indented!(
                "Level: {} ({})",
                decision.level(),
                decision.resolution.key
            );
        }
        None => log_indented!("No decision was made"),
    }
    if outcome.connect_attempts > 1 {
        log_indented!("Connect attempts: {}", outcome.connect_attempts);
    }
    log_end!();
}

fn solar(
    debug_enabled: bool,
    config_dir: Option<String>,
    latitude: f64,
    longitude: f64,
    date: Option<&str>,
) -> Result<()> {
    Log::set_debug(debug_enabled);
    log_version!();

    if LocationFix::new(latitude, longitude, Local::now()).is_none() {
        anyhow::bail!("Location out of range: {latitude}, {longitude}");
    }

    config::set_config_dir(config_dir)?;
    let config_path = config::get_config_path()?;
    let config = if config_path.exists() {
        Config::load_from_path(&config_path)?
    } else {
        Config::default()
    };

    let date = match date {
        Some(date) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{date}', use YYYY-MM-DD"))?,
        None => Local::now().date_naive(),
    };
    let tz = match config.timezone()? {
        Some(tz) => tz,
        None => local_timezone(),
    };

    log_solar_window(latitude, longitude, date, tz, config.sun_angles());
    log_end!();
    Ok(())
}

fn receive(debug_enabled: bool, scale: LevelScale, automatic: bool) -> Result<()> {
    // stdout carries the device values
    Log::set_target(Target::Stderr);
    Log::set_debug(debug_enabled);
    log_version!();

    let mode = if automatic {
        ReceiverMode::Automatic
    } else {
        ReceiverMode::Manual
    };
    let mut stdout = io::stdout().lock();
    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read messages")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match receive_line(line, scale, mode) {
            Ok(Some(value)) => {
                writeln!(stdout, "{value}").context("Failed to write device value")?;
                stdout.flush().context("Failed to write device value")?;
            }
            Ok(None) => log_debug!("Nothing to apply for {}", line),
            Err(e) => log_warning!("{:#}", e),
        }
    }
    log_end!();
    Ok(())
}

/// The system zone from `TZ`, falling back to UTC.
fn local_timezone() -> chrono_tz::Tz {
    std::env::var("TZ")
        .ok()
        .and_then(|name| name.parse().ok())
        .unwrap_or(chrono_tz::UTC)
}
