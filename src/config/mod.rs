//! Configuration for wearlux.
//!
//! Settings live in `wearlux.toml`, searched in `$XDG_CONFIG_HOME/wearlux/`
//! unless `--config <dir>` points elsewhere. A commented default file is
//! written on first start. Every field is optional:
//!
//! ```toml
//! #[Day/night]
//! daynight_source = "location"  # "location" (sun elevation) or "ambient_light" (lux)
//! sunrise_angle = 15.0          # Sun elevation in degrees that starts the day (-18 to 60)
//! sunset_angle = 5.0            # Sun elevation in degrees that ends the day (-18 to 60)
//! timezone = "Europe/Zurich"    # IANA zone for picking the calendar date (default: system)
//! latitude = 47.3769            # Fallback location until a fix arrives
//! longitude = 8.5417
//!
//! #[Ambient light]
//! link_brightness = true        # Sample light while the screen is on
//! value_delay_ms = 5000         # Sampling window, ticks are half this apart
//! min_screen_time_ms = 10000    # Shorter sessions report their brightest reading
//! daylight_lux_high = 400.0     # Above this the light counts as day
//! daylight_lux_low = 150.0      # Below this the light counts as night
//!
//! #[Dispatch]
//! detection_interval_ms = 600000
//! signal_timeout_ms = 0         # 0 waits for both signals forever
//! connect_retries = 0
//! retry_backoff_ms = 500
//! preferences_file = "levels.toml"
//! ```
//!
//! Values are validated on load; anything out of range is an error rather
//! than silently clamped.

pub mod builder;
pub mod loading;
pub mod validation;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ambient::{DaylightClassifier, SamplerSettings};
use crate::constants::*;
use crate::engine::{CycleSettings, RetryPolicy};
use crate::geo::solar::SunAngles;
use crate::signal::{Corroborator, LightSample, LocationFix};

pub use builder::create_default_config;
pub use loading::{get_config_path, get_custom_config_dir, load, load_from_path, set_config_dir};

/// Where the day/night half of a decision comes from.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DayNightSource {
    /// Sun elevation at the latest location fix.
    #[default]
    Location,
    /// Representative lux of the last screen session.
    AmbientLight,
}

impl DayNightSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayNightSource::Location => "location",
            DayNightSource::AmbientLight => "ambient_light",
        }
    }
    /// Pick the corroborator this source decides from. The other signal is ignored.
    pub fn select(
        self,
        location: Option<LocationFix>,
        light: Option<LightSample>,
    ) -> Option<Corroborator> {
        match self {
            DayNightSource::Location => location.map(Corroborator::Location),
            DayNightSource::AmbientLight => light.map(Corroborator::AmbientLight),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct Config {
    pub daynight_source: Option<DayNightSource>,
    pub sunrise_angle: Option<f64>, // degrees above the horizon
    pub sunset_angle: Option<f64>,
    pub timezone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    /// Whether the screen monitor samples light at all.
    pub link_brightness: Option<bool>,
    /// Whether the host has an ambient light sensor.
    pub light_sensor: Option<bool>,
    /// Whether the host has an activity recognizer.
    pub activity_recognition: Option<bool>,
    pub value_delay_ms: Option<u64>,
    pub min_screen_time_ms: Option<u64>,
    pub daylight_lux_high: Option<f32>,
    pub daylight_lux_low: Option<f32>,

    pub detection_interval_ms: Option<u64>,
    pub signal_timeout_ms: Option<u64>, // 0 disables the deadline
    pub connect_retries: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    /// Level table path, relative paths resolve against the config directory.
    pub preferences_file: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load()
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        load_from_path(path)
    }

    pub fn daynight_source(&self) -> DayNightSource {
        self.daynight_source.unwrap_or_default()
    }

    pub fn sun_angles(&self) -> SunAngles {
        SunAngles {
            sunrise: self.sunrise_angle.unwrap_or(DEFAULT_SUNRISE_ANGLE),
            sunset: self.sunset_angle.unwrap_or(DEFAULT_SUNSET_ANGLE),
        }
    }

    /// Configured zone, `None` for system local time.
    pub fn timezone(&self) -> Result<Option<Tz>> {
        self.timezone
            .as_deref()
            .map(|name| {
                name.parse::<Tz>()
                    .map_err(|e| anyhow::anyhow!("Unknown timezone '{}': {}", name, e))
            })
            .transpose()
    }

    pub fn link_brightness(&self) -> bool {
        self.link_brightness.unwrap_or(true)
    }

    pub fn light_sensor(&self) -> bool {
        self.light_sensor.unwrap_or(true)
    }

    pub fn activity_recognition(&self) -> bool {
        self.activity_recognition.unwrap_or(true)
    }

    pub fn sampler_settings(&self) -> SamplerSettings {
        SamplerSettings {
            value_delay: Duration::from_millis(
                self.value_delay_ms.unwrap_or(DEFAULT_VALUE_DELAY_MS),
            ),
            min_screen_time: Duration::from_millis(
                self.min_screen_time_ms
                    .unwrap_or(DEFAULT_MIN_SCREEN_TIME_MS),
            ),
        }
    }

    pub fn daylight_classifier(&self) -> DaylightClassifier {
        DaylightClassifier::new(
            self.daylight_lux_high.unwrap_or(DEFAULT_DAYLIGHT_LUX_HIGH),
            self.daylight_lux_low.unwrap_or(DEFAULT_DAYLIGHT_LUX_LOW),
        )
    }

    pub fn detection_interval(&self) -> Duration {
        Duration::from_millis(
            self.detection_interval_ms
                .unwrap_or(DEFAULT_DETECTION_INTERVAL_MS),
        )
    }

    pub fn cycle_settings(&self) -> CycleSettings {
        let timeout_ms = self.signal_timeout_ms.unwrap_or(DEFAULT_SIGNAL_TIMEOUT_MS);
        CycleSettings {
            signal_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
            retry: RetryPolicy {
                max_retries: self.connect_retries.unwrap_or(DEFAULT_CONNECT_RETRIES),
                base_backoff: Duration::from_millis(
                    self.retry_backoff_ms.unwrap_or(DEFAULT_RETRY_BACKOFF_MS),
                ),
            },
        }
    }

    /// Static location used before the first live fix.
    pub fn fallback_location(&self, at: DateTime<Local>) -> Option<LocationFix> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => LocationFix::new(lat, lon, at),
            _ => None,
        }
    }

    /// Level table location. Relative paths resolve against `config_dir`.
    pub fn preferences_path(&self, config_dir: &Path) -> PathBuf {
        let file = self
            .preferences_file
            .as_deref()
            .unwrap_or(DEFAULT_PREFERENCES_FILE_NAME);
        let path = PathBuf::from(file);
        if path.is_absolute() {
            path
        } else {
            config_dir.join(path)
        }
    }

    pub fn log_config(&self, source: &Path) {
        log_block_start!("Loaded configuration");
        log_indented!("File: {}", source.display());

        let source_mode = self.daynight_source();
        log_indented!("Day/night source: {}", source_mode.as_str());

        match source_mode {
            DayNightSource::Location => {
                let angles = self.sun_angles();
                log_indented!(
                    "Day window: sun above {:.1}° (morning) / {:.1}° (evening)",
                    angles.sunrise,
                    angles.sunset
                );
                if let (Some(lat), Some(lon)) = (self.latitude, self.longitude) {
                    let lat_dir = if lat >= 0.0 { "N" } else { "S" };
                    let lon_dir = if lon >= 0.0 { "E" } else { "W" };
                    log_indented!(
                        "Fallback location: {:.3}°{}, {:.3}°{}",
                        lat.abs(),
                        lat_dir,
                        lon.abs(),
                        lon_dir
                    );
                }
                if let Some(ref tz) = self.timezone {
                    log_indented!("Timezone: {}", tz);
                }
            }
            DayNightSource::AmbientLight => {
                let sampler = self.sampler_settings();
                log_indented!(
                    "Sampling: {}ms window, {}ms minimum screen time",
                    sampler.value_delay.as_millis(),
                    sampler.min_screen_time.as_millis()
                );
                log_indented!(
                    "Daylight: above {} lx, night below {} lx",
                    self.daylight_lux_high.unwrap_or(DEFAULT_DAYLIGHT_LUX_HIGH),
                    self.daylight_lux_low.unwrap_or(DEFAULT_DAYLIGHT_LUX_LOW)
                );
            }
        }

        let cycle = self.cycle_settings();
        match cycle.signal_timeout {
            Some(timeout) => log_indented!("Signal timeout: {}ms", timeout.as_millis()),
            None => log_indented!("Signal timeout: none"),
        }
        if cycle.retry.max_retries > 0 {
            log_indented!(
                "Connect retries: {} (backoff from {}ms)",
                cycle.retry.max_retries,
                cycle.retry.base_backoff.as_millis()
            );
        }
    }
}

/// Directory holding the active `wearlux.toml`.
pub fn config_dir() -> Result<PathBuf> {
    let path = get_config_path()?;
    path.parent()
        .map(Path::to_path_buf)
        .context("Could not determine config directory")
}

#[cfg(test)]
mod tests;
