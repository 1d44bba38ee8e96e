//! Brightness levels and the level-to-device lookup table.
//!
//! Levels travel between devices as small ordinals, never as raw device
//! brightness, so the receiving side can map them onto whatever range its
//! display supports. The mapping below is the fixed table both sides agree on.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{BRIGHTNESS_FIELD, BRIGHTNESS_PATH};

/// Discrete brightness step, ordered from dimmest to brightest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrightnessLevel {
    Lowest,
    MediumLow,
    Medium,
    MediumHigh,
    Highest,
}

impl BrightnessLevel {
    pub const ALL: [BrightnessLevel; 5] = [
        BrightnessLevel::Lowest,
        BrightnessLevel::MediumLow,
        BrightnessLevel::Medium,
        BrightnessLevel::MediumHigh,
        BrightnessLevel::Highest,
    ];

    /// Wire ordinal (0 = Lowest .. 4 = Highest).
    pub fn ordinal(self) -> i32 {
        match self {
            BrightnessLevel::Lowest => 0,
            BrightnessLevel::MediumLow => 1,
            BrightnessLevel::Medium => 2,
            BrightnessLevel::MediumHigh => 3,
            BrightnessLevel::Highest => 4,
        }
    }

    pub fn from_ordinal(ordinal: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.ordinal() == ordinal)
    }

    /// Device brightness for this level on the five-step scale.
    pub fn device_value(self) -> u8 {
        LevelScale::FiveStep.device_value(self.ordinal())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BrightnessLevel::Lowest => "lowest",
            BrightnessLevel::MediumLow => "medium_low",
            BrightnessLevel::Medium => "medium",
            BrightnessLevel::MediumHigh => "medium_high",
            BrightnessLevel::Highest => "highest",
        }
    }
}

impl fmt::Display for BrightnessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrightnessLevel {
    type Err = anyhow::Error;

    /// Accepts a level name (`"medium_high"`, `"MediumHigh"`) or an ordinal (`"3"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(ordinal) = trimmed.parse::<i32>() {
            return Self::from_ordinal(ordinal)
                .ok_or_else(|| anyhow::anyhow!("Brightness ordinal {ordinal} is out of range (0-4)"));
        }

        let normalized = trimmed.to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "lowest" | "low" => Ok(BrightnessLevel::Lowest),
            "medium_low" | "mediumlow" => Ok(BrightnessLevel::MediumLow),
            "medium" => Ok(BrightnessLevel::Medium),
            "medium_high" | "mediumhigh" => Ok(BrightnessLevel::MediumHigh),
            "highest" | "high" => Ok(BrightnessLevel::Highest),
            _ => anyhow::bail!("Unknown brightness level '{trimmed}'"),
        }
    }
}

/// Device lookup table variant.
///
/// The five-step scale is what wearlux sends. The three-step scale is kept
/// for receivers paired with senders that only know Lowest/Medium/Highest
/// (ordinals 0/1/2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelScale {
    ThreeStep,
    #[default]
    FiveStep,
}

impl FromStr for LevelScale {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "three" | "three_step" | "3" => Ok(LevelScale::ThreeStep),
            "five" | "five_step" | "5" => Ok(LevelScale::FiveStep),
            other => anyhow::bail!("Unknown level scale '{other}', use three or five"),
        }
    }
}

impl LevelScale {
    /// Map a received ordinal to device brightness. Unknown ordinals map to Medium.
    pub fn device_value(self, ordinal: i32) -> u8 {
        match (self, ordinal) {
            (LevelScale::ThreeStep, 0) => 10,
            (LevelScale::ThreeStep, 2) => 255,
            (LevelScale::ThreeStep, _) => 140,
            (LevelScale::FiveStep, 0) => 10,
            (LevelScale::FiveStep, 1) => 65,
            (LevelScale::FiveStep, 3) => 190,
            (LevelScale::FiveStep, 4) => 255,
            (LevelScale::FiveStep, _) => 130,
        }
    }

    /// Ordinal used when a message lacks the level field.
    pub fn medium_ordinal(self) -> i32 {
        match self {
            LevelScale::ThreeStep => 1,
            LevelScale::FiveStep => BrightnessLevel::Medium.ordinal(),
        }
    }
}

/// One outgoing message to the paired device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrightnessMessage {
    pub level: BrightnessLevel,
}

impl BrightnessMessage {
    pub fn new(level: BrightnessLevel) -> Self {
        Self { level }
    }

    pub fn path(&self) -> &'static str {
        BRIGHTNESS_PATH
    }

    pub fn field(&self) -> &'static str {
        BRIGHTNESS_FIELD
    }

    /// `{"path":"/brightness","data":{"brightness_level":N}}`
    pub fn to_json(&self) -> serde_json::Value {
        let mut data = serde_json::Map::new();
        data.insert(self.field().to_string(), self.level.ordinal().into());
        serde_json::json!({ "path": self.path(), "data": data })
    }
}

/// Brightness mode currently active on the receiving display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverMode {
    Manual,
    Automatic,
}

/// Handle a message on the receiving side.
///
/// This is the paired display's half of the exchange; the `receive` command
/// runs it over message lines. Returns the device brightness to apply, or
/// `None` when the message is for another path or the display is in
/// automatic mode.
pub fn apply_received(
    path: &str,
    data: &serde_json::Value,
    scale: LevelScale,
    mode: ReceiverMode,
) -> Option<u8> {
    if path != BRIGHTNESS_PATH {
        return None;
    }

    let ordinal = data
        .get(BRIGHTNESS_FIELD)
        .and_then(serde_json::Value::as_i64)
        .and_then(|v| i32::try_from(v).ok())
        .unwrap_or_else(|| scale.medium_ordinal());
    let device_value = scale.device_value(ordinal);

    log_debug!("Received brightness ordinal {ordinal} (device value {device_value})");

    match mode {
        ReceiverMode::Automatic => {
            log_debug!("Display is in automatic brightness mode, leaving it alone");
            None
        }
        ReceiverMode::Manual => Some(device_value),
    }
}

/// Parse one wire line and handle it as the receiving display would.
pub fn receive_line(line: &str, scale: LevelScale, mode: ReceiverMode) -> anyhow::Result<Option<u8>> {
    let message: serde_json::Value =
        serde_json::from_str(line).with_context(|| format!("Invalid message: {line}"))?;
    let path = message
        .get("path")
        .and_then(serde_json::Value::as_str)
        .with_context(|| format!("Message has no path: {line}"))?;
    let data = message.get("data").unwrap_or(&serde_json::Value::Null);
    Ok(apply_received(path, data, scale, mode))
}
