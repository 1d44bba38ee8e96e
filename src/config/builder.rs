//! Default configuration file generation.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::constants::*;

/// Write a commented default `wearlux.toml` at `path`.
pub fn create_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    let content = ConfigBuilder::new()
        .add_section("Day/night")
        .add_setting(
            "daynight_source",
            "\"location\"",
            "\"location\" (sun elevation) or \"ambient_light\" (lux)",
        )
        .add_setting(
            "sunrise_angle",
            &format!("{DEFAULT_SUNRISE_ANGLE:.1}"),
            &format!(
                "Sun elevation in degrees that starts the day ({MINIMUM_SUN_ANGLE}-{MAXIMUM_SUN_ANGLE})"
            ),
        )
        .add_setting(
            "sunset_angle",
            &format!("{DEFAULT_SUNSET_ANGLE:.1}"),
            &format!(
                "Sun elevation in degrees that ends the day ({MINIMUM_SUN_ANGLE}-{MAXIMUM_SUN_ANGLE})"
            ),
        )
        .add_section("Ambient light")
        .add_setting(
            "link_brightness",
            "true",
            "Sample ambient light while the screen is on",
        )
        .add_setting(
            "value_delay_ms",
            &DEFAULT_VALUE_DELAY_MS.to_string(),
            &format!("Sampling window, ticks are half this apart (1-{MAXIMUM_VALUE_DELAY_MS})"),
        )
        .add_setting(
            "min_screen_time_ms",
            &DEFAULT_MIN_SCREEN_TIME_MS.to_string(),
            "Shorter screen sessions report their brightest reading",
        )
        .add_setting(
            "daylight_lux_high",
            &format!("{DEFAULT_DAYLIGHT_LUX_HIGH:.1}"),
            "Above this the light counts as day",
        )
        .add_setting(
            "daylight_lux_low",
            &format!("{DEFAULT_DAYLIGHT_LUX_LOW:.1}"),
            "Below this the light counts as night",
        )
        .add_section("Dispatch")
        .add_setting(
            "detection_interval_ms",
            &DEFAULT_DETECTION_INTERVAL_MS.to_string(),
            "Activity recognition period",
        )
        .add_setting(
            "signal_timeout_ms",
            &DEFAULT_SIGNAL_TIMEOUT_MS.to_string(),
            "Decide on activity alone after this long (0 = wait forever)",
        )
        .add_setting(
            "connect_retries",
            &DEFAULT_CONNECT_RETRIES.to_string(),
            &format!("Reconnect attempts after a failed connection (0-{MAXIMUM_CONNECT_RETRIES})"),
        )
        .add_setting(
            "retry_backoff_ms",
            &DEFAULT_RETRY_BACKOFF_MS.to_string(),
            "First reconnect delay, doubled on each retry",
        )
        .add_setting(
            "preferences_file",
            &format!("\"{DEFAULT_PREFERENCES_FILE_NAME}\""),
            "Brightness level table",
        )
        .build();

    fs::write(path, content + "\n")
        .with_context(|| format!("Failed to write default config to {}", path.display()))?;

    log_block_start!("Created default configuration");
    log_indented!("{}", path.display());
    Ok(())
}

struct ConfigBuilder {
    entries: Vec<Entry>,
}

enum Entry {
    Section(String),
    Setting { line: String, comment: String },
}

impl ConfigBuilder {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn add_section(mut self, title: &str) -> Self {
        self.entries.push(Entry::Section(format!("#[{title}]")));
        self
    }

    fn add_setting(mut self, key: &str, value: &str, comment: &str) -> Self {
        self.entries.push(Entry::Setting {
            line: format!("{key} = {value}"),
            comment: format!("# {comment}"),
        });
        self
    }

    /// Render with all comments aligned one column past the longest setting.
    fn build(self) -> String {
        let width = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Setting { line, .. } => Some(line.len()),
                Entry::Section(_) => None,
            })
            .max()
            .unwrap_or(0)
            + 1;

        let mut lines = Vec::new();
        for entry in self.entries {
            match entry {
                Entry::Section(title) => {
                    if !lines.is_empty() {
                        lines.push(String::new());
                    }
                    lines.push(title);
                }
                Entry::Setting { line, comment } => {
                    lines.push(format!("{line:width$}{comment}"));
                }
            }
        }
        lines.join("\n")
    }
}
