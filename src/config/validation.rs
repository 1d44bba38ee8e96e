//! Configuration validation.

use anyhow::Result;

use super::Config;
use crate::constants::*;

/// Reject configurations that cannot produce sensible decisions.
pub fn validate_config(config: &Config) -> Result<()> {
    if let Some(lat) = config.latitude
        && !(-90.0..=90.0).contains(&lat)
    {
        anyhow::bail!("latitude must be between -90 and 90 degrees (got {})", lat);
    }

    if let Some(lon) = config.longitude
        && !(-180.0..=180.0).contains(&lon)
    {
        anyhow::bail!(
            "longitude must be between -180 and 180 degrees (got {})",
            lon
        );
    }

    if config.latitude.is_some() != config.longitude.is_some() {
        anyhow::bail!("latitude and longitude must be set together");
    }

    for (name, angle) in [
        ("sunrise_angle", config.sunrise_angle),
        ("sunset_angle", config.sunset_angle),
    ] {
        if let Some(angle) = angle
            && !(MINIMUM_SUN_ANGLE..=MAXIMUM_SUN_ANGLE).contains(&angle)
        {
            anyhow::bail!(
                "{} ({}°) must be between {}° and {}°",
                name,
                angle,
                MINIMUM_SUN_ANGLE,
                MAXIMUM_SUN_ANGLE
            );
        }
    }

    config.timezone()?;

    let value_delay = config.value_delay_ms.unwrap_or(DEFAULT_VALUE_DELAY_MS);
    if !(1..=MAXIMUM_VALUE_DELAY_MS).contains(&value_delay) {
        anyhow::bail!(
            "value_delay_ms ({}) must be between 1 and {} milliseconds",
            value_delay,
            MAXIMUM_VALUE_DELAY_MS
        );
    }

    let min_screen_time = config
        .min_screen_time_ms
        .unwrap_or(DEFAULT_MIN_SCREEN_TIME_MS);
    if min_screen_time < value_delay / 2 {
        anyhow::bail!(
            "min_screen_time_ms ({}) must be at least half of value_delay_ms ({})",
            min_screen_time,
            value_delay
        );
    }

    let lux_high = config.daylight_lux_high.unwrap_or(DEFAULT_DAYLIGHT_LUX_HIGH);
    let lux_low = config.daylight_lux_low.unwrap_or(DEFAULT_DAYLIGHT_LUX_LOW);
    if !lux_high.is_finite() || !lux_low.is_finite() || lux_low < 0.0 {
        anyhow::bail!("daylight lux thresholds must be finite and non-negative");
    }
    if lux_low > lux_high {
        anyhow::bail!(
            "daylight_lux_low ({}) must not exceed daylight_lux_high ({})",
            lux_low,
            lux_high
        );
    }

    if config.detection_interval_ms == Some(0) {
        anyhow::bail!("detection_interval_ms must be greater than 0");
    }

    if let Some(retries) = config.connect_retries
        && retries > MAXIMUM_CONNECT_RETRIES
    {
        anyhow::bail!(
            "connect_retries ({}) must be at most {}",
            retries,
            MAXIMUM_CONNECT_RETRIES
        );
    }

    if let Some(backoff) = config.retry_backoff_ms
        && backoff > MAXIMUM_RETRY_BACKOFF_MS
    {
        anyhow::bail!(
            "retry_backoff_ms ({}) must be at most {} milliseconds",
            backoff,
            MAXIMUM_RETRY_BACKOFF_MS
        );
    }

    if let Some(ref file) = config.preferences_file
        && file.trim().is_empty()
    {
        anyhow::bail!("preferences_file must not be empty");
    }

    Ok(())
}
