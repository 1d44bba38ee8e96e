//! Day/night boundaries from sun elevation.
//!
//! Daytime is bounded by two independently configured sun elevations: the
//! morning boundary is the instant the sun climbs through `sunrise` degrees,
//! the evening boundary the instant it sinks through `sunset` degrees. A
//! steeper morning angle gives an asymmetric window that starts later in the
//! morning than it ends in the evening.
//!
//! Event instants come from the `sunrise` crate. Whether the sun reaches a
//! given elevation at all on a date is checked beforehand from the solar
//! declination, so polar days and nights yield `None` instead of garbage
//! instants.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone};
use std::f64::consts::PI;
use sunrise::{Coordinates, SolarDay, SolarEvent};

use crate::constants::{DEFAULT_SUNRISE_ANGLE, DEFAULT_SUNSET_ANGLE};
use crate::signal::LocationFix;

/// Sun elevations (degrees above the horizon, negative below) that bound daytime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunAngles {
    pub sunrise: f64,
    pub sunset: f64,
}

impl Default for SunAngles {
    fn default() -> Self {
        Self {
            sunrise: DEFAULT_SUNRISE_ANGLE,
            sunset: DEFAULT_SUNSET_ANGLE,
        }
    }
}

/// Morning and evening boundaries of daytime for one date.
#[derive(Debug, Clone, PartialEq)]
pub struct SolarTimes<Tz: TimeZone> {
    pub sunrise: DateTime<Tz>,
    pub sunset: DateTime<Tz>,
}

impl<Tz: TimeZone> SolarTimes<Tz> {
    /// `sunrise <= now < sunset`
    pub fn contains(&self, now: &DateTime<Tz>) -> bool {
        *now >= self.sunrise && *now < self.sunset
    }
}

/// Approximate solar declination in radians for a day of the year.
fn solar_declination(day_of_year: u32) -> f64 {
    let angle = 2.0 * PI / 365.0 * (284.0 + day_of_year as f64);
    23.44_f64.to_radians() * angle.sin()
}

/// Whether the sun crosses `elevation_deg` at this latitude on this day.
fn crosses_elevation(latitude: f64, day_of_year: u32, elevation_deg: f64) -> bool {
    let lat = latitude.to_radians();
    let decl = solar_declination(day_of_year);
    let denominator = lat.cos() * decl.cos();
    if denominator.abs() < 1e-9 {
        return false;
    }
    let cos_hour_angle = (elevation_deg.to_radians().sin() - lat.sin() * decl.sin()) / denominator;
    (-1.0..=1.0).contains(&cos_hour_angle)
}

/// Compute the daytime boundaries for `date` at a location.
///
/// Returns `None` when either boundary does not occur that day (the sun
/// stays above or below the requested elevation), when the coordinates are
/// invalid, or when the computed window is empty.
pub fn calculate_solar_times<Tz: TimeZone>(
    latitude: f64,
    longitude: f64,
    date: NaiveDate,
    tz: &Tz,
    angles: SunAngles,
) -> Option<SolarTimes<Tz>> {
    let coordinates = Coordinates::new(latitude, longitude)?;

    let day_of_year = date.ordinal();
    if !crosses_elevation(latitude, day_of_year, angles.sunrise)
        || !crosses_elevation(latitude, day_of_year, angles.sunset)
    {
        return None;
    }

    let solar_day = SolarDay::new(coordinates, date);
    let sunrise_utc = solar_day.event_time(SolarEvent::Elevation {
        elevation: angles.sunrise.to_radians(),
        morning: true,
    });
    let sunset_utc = solar_day.event_time(SolarEvent::Elevation {
        elevation: angles.sunset.to_radians(),
        morning: false,
    });

    // Both events belong to the solar day around local noon of `date`.
    let noon = date.and_hms_opt(12, 0, 0)?.and_utc()
        - chrono::Duration::seconds((longitude / 15.0 * 3600.0) as i64);
    let plausible = |t: &DateTime<chrono::Utc>| (*t - noon).num_hours().abs() <= 24;
    if !plausible(&sunrise_utc) || !plausible(&sunset_utc) || sunrise_utc >= sunset_utc {
        return None;
    }

    Some(SolarTimes {
        sunrise: sunrise_utc.with_timezone(tz),
        sunset: sunset_utc.with_timezone(tz),
    })
}

/// Whether `now` is daytime at the given location.
///
/// Assumes daytime when no location is known or the boundaries are undefined.
pub fn is_daytime<Tz: TimeZone>(
    location: Option<&LocationFix>,
    now: &DateTime<Tz>,
    angles: SunAngles,
) -> bool {
    let Some(fix) = location else {
        log_debug!("No location known, assuming daytime");
        return true;
    };

    let tz = now.timezone();
    match calculate_solar_times(fix.latitude, fix.longitude, now.date_naive(), &tz, angles) {
        Some(times) => {
            log_debug!(
                "Daytime window: {} to {} (sun at {:.1}° / {:.1}°)",
                times.sunrise.naive_local().format("%H:%M:%S"),
                times.sunset.naive_local().format("%H:%M:%S"),
                angles.sunrise,
                angles.sunset
            );
            times.contains(now)
        }
        None => {
            log_debug!(
                "Sun does not cross the configured elevations at {:.3}°, assuming daytime",
                fix.latitude
            );
            true
        }
    }
}
