//! Compiled-in defaults, limits, and wire constants.

// # Wire contract with the paired device

/// Data path the brightness message is published on.
pub const BRIGHTNESS_PATH: &str = "/brightness";
/// Integer field carrying the level ordinal.
pub const BRIGHTNESS_FIELD: &str = "brightness_level";

// # Day/night geometry

/// Sun elevation (degrees above the horizon) at which the morning counts as day.
pub const DEFAULT_SUNRISE_ANGLE: f64 = 15.0;
/// Sun elevation (degrees above the horizon) at which the evening counts as night.
pub const DEFAULT_SUNSET_ANGLE: f64 = 5.0;
pub const MINIMUM_SUN_ANGLE: f64 = -18.0;
pub const MAXIMUM_SUN_ANGLE: f64 = 60.0;

// # Ambient light sampling

pub const DEFAULT_VALUE_DELAY_MS: u64 = 5_000;
pub const DEFAULT_MIN_SCREEN_TIME_MS: u64 = 10_000;
pub const MAXIMUM_VALUE_DELAY_MS: u64 = 60_000;
pub const DEFAULT_DAYLIGHT_LUX_HIGH: f32 = 400.0;
pub const DEFAULT_DAYLIGHT_LUX_LOW: f32 = 150.0;

// # Scheduling and dispatch

/// Activity classification period (10 minutes).
pub const DEFAULT_DETECTION_INTERVAL_MS: u64 = 600_000;
/// 0 disables the signal deadline.
pub const DEFAULT_SIGNAL_TIMEOUT_MS: u64 = 0;
pub const DEFAULT_CONNECT_RETRIES: u32 = 0;
pub const MAXIMUM_CONNECT_RETRIES: u32 = 10;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;
/// Upper bound for one exponential backoff step.
pub const MAXIMUM_RETRY_BACKOFF_MS: u64 = 60_000;

// # Files

pub const CONFIG_DIR_NAME: &str = "wearlux";
pub const CONFIG_FILE_NAME: &str = "wearlux.toml";
pub const DEFAULT_PREFERENCES_FILE_NAME: &str = "levels.toml";

// # Process exit codes

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
