//! Detected physical activity.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Activity classes reported by the activity recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    InVehicle,
    OnBicycle,
    Walking,
    Running,
    Still,
    OnFoot,
    Tilting,
    Unknown,
}

impl ActivityType {
    pub const ALL: [ActivityType; 8] = [
        ActivityType::InVehicle,
        ActivityType::OnBicycle,
        ActivityType::Walking,
        ActivityType::Running,
        ActivityType::Still,
        ActivityType::OnFoot,
        ActivityType::Tilting,
        ActivityType::Unknown,
    ];

    /// Map a recognizer's numeric code. Codes it does not know become `Unknown`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ActivityType::InVehicle,
            1 => ActivityType::OnBicycle,
            2 => ActivityType::OnFoot,
            3 => ActivityType::Still,
            5 => ActivityType::Tilting,
            7 => ActivityType::Walking,
            8 => ActivityType::Running,
            _ => ActivityType::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::InVehicle => "in_vehicle",
            ActivityType::OnBicycle => "on_bicycle",
            ActivityType::Walking => "walking",
            ActivityType::Running => "running",
            ActivityType::Still => "still",
            ActivityType::OnFoot => "on_foot",
            ActivityType::Tilting => "tilting",
            ActivityType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "in_vehicle" | "vehicle" | "driving" => Ok(ActivityType::InVehicle),
            "on_bicycle" | "bicycle" | "cycling" => Ok(ActivityType::OnBicycle),
            "walking" => Ok(ActivityType::Walking),
            "running" => Ok(ActivityType::Running),
            "still" => Ok(ActivityType::Still),
            "on_foot" => Ok(ActivityType::OnFoot),
            "tilting" => Ok(ActivityType::Tilting),
            "unknown" => Ok(ActivityType::Unknown),
            _ => anyhow::bail!("Unknown activity '{}'", s.trim()),
        }
    }
}

/// The most probable activity of one detection batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedActivity {
    pub activity: ActivityType,
    /// Recognizer confidence, 0-100. Diagnostic only.
    pub confidence: u8,
    pub observed_at: DateTime<Local>,
}

impl DetectedActivity {
    pub fn new(activity: ActivityType, confidence: u8, observed_at: DateTime<Local>) -> Self {
        Self {
            activity,
            confidence: confidence.min(100),
            observed_at,
        }
    }
}
