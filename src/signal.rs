//! Location and light signals that corroborate an activity detection.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Last known position. Only the most recent fix matters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub observed_at: DateTime<Local>,
}

impl LocationFix {
    /// Returns `None` for coordinates outside the valid ranges.
    pub fn new(latitude: f64, longitude: f64, observed_at: DateTime<Local>) -> Option<Self> {
        let valid = (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
            observed_at,
        })
    }
}

/// One ambient light reading in lux.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightSample {
    pub lux: f32,
    pub observed_at: DateTime<Local>,
}

impl LightSample {
    /// Negative and non-finite readings are clamped to 0.
    pub fn new(lux: f32, observed_at: DateTime<Local>) -> Self {
        let lux = if lux.is_finite() { lux.max(0.0) } else { 0.0 };
        Self { lux, observed_at }
    }
}

/// The second signal a decision waits for besides the activity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Corroborator {
    Location(LocationFix),
    AmbientLight(LightSample),
}

impl Corroborator {
    pub fn observed_at(&self) -> DateTime<Local> {
        match self {
            Corroborator::Location(fix) => fix.observed_at,
            Corroborator::AmbientLight(sample) => sample.observed_at,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Corroborator::Location(fix) => {
                let lat_dir = if fix.latitude >= 0.0 { "N" } else { "S" };
                let lon_dir = if fix.longitude >= 0.0 { "E" } else { "W" };
                format!(
                    "location {:.3}°{}, {:.3}°{}",
                    fix.latitude.abs(),
                    lat_dir,
                    fix.longitude.abs(),
                    lon_dir
                )
            }
            Corroborator::AmbientLight(sample) => format!("ambient light {:.1} lx", sample.lux),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_fix_validation() {
        let now = Local::now();
        assert!(LocationFix::new(40.7128, -74.0060, now).is_some());
        assert!(LocationFix::new(91.0, 0.0, now).is_none());
        assert!(LocationFix::new(0.0, -180.5, now).is_none());
        assert!(LocationFix::new(f64::NAN, 0.0, now).is_none());
    }

    #[test]
    fn test_light_sample_clamps() {
        let now = Local::now();
        assert_eq!(LightSample::new(-4.0, now).lux, 0.0);
        assert_eq!(LightSample::new(f32::NAN, now).lux, 0.0);
        assert_eq!(LightSample::new(312.5, now).lux, 312.5);
    }

    #[test]
    fn test_describe_location() {
        let fix = LocationFix::new(-33.8688, 151.2093, Local::now()).unwrap();
        assert_eq!(
            Corroborator::Location(fix).describe(),
            "location 33.869°S, 151.209°E"
        );
    }
}
