//! Preference cells mapping (activity, day/night) to a brightness level.
//!
//! Each cell has a string key, resolved through an external key→value
//! [`PreferenceStore`], and a compiled-in default used when the store has no
//! value or holds something unparsable. Both the key and the default are
//! exhaustive matches over [`ActivityCell`] × [`DayPeriod`], so adding an
//! activity without filling in its cells does not compile.

pub mod store;

pub use store::{MemoryStore, PreferenceStore, TomlPreferenceStore};

use std::fmt;

use crate::activity::ActivityType;
use crate::brightness::BrightnessLevel;

/// Whether it is currently day or night at the user's location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DayPeriod {
    Day,
    Night,
}

impl DayPeriod {
    pub fn from_is_day(is_day: bool) -> Self {
        if is_day { DayPeriod::Day } else { DayPeriod::Night }
    }
}

impl fmt::Display for DayPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayPeriod::Day => f.write_str("day"),
            DayPeriod::Night => f.write_str("night"),
        }
    }
}

/// Activity column of the preference table.
///
/// `Tilting` has no column of its own and shares the on-foot cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityCell {
    Driving,
    OnBicycle,
    Walking,
    Running,
    Still,
    OnFoot,
    Unknown,
}

impl ActivityCell {
    pub const ALL: [ActivityCell; 7] = [
        ActivityCell::Driving,
        ActivityCell::OnBicycle,
        ActivityCell::Walking,
        ActivityCell::Running,
        ActivityCell::Still,
        ActivityCell::OnFoot,
        ActivityCell::Unknown,
    ];

    pub fn for_activity(activity: ActivityType) -> Self {
        match activity {
            ActivityType::InVehicle => ActivityCell::Driving,
            ActivityType::OnBicycle => ActivityCell::OnBicycle,
            ActivityType::Walking => ActivityCell::Walking,
            ActivityType::Running => ActivityCell::Running,
            ActivityType::Still => ActivityCell::Still,
            ActivityType::OnFoot => ActivityCell::OnFoot,
            ActivityType::Tilting => ActivityCell::OnFoot,
            ActivityType::Unknown => ActivityCell::Unknown,
        }
    }
}

/// One (activity, day/night) cell of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreferenceKey {
    pub cell: ActivityCell,
    pub period: DayPeriod,
}

impl PreferenceKey {
    pub fn new(activity: ActivityType, period: DayPeriod) -> Self {
        Self {
            cell: ActivityCell::for_activity(activity),
            period,
        }
    }

    /// Every cell in the table.
    pub fn all() -> impl Iterator<Item = PreferenceKey> {
        ActivityCell::ALL.into_iter().flat_map(|cell| {
            [DayPeriod::Day, DayPeriod::Night]
                .into_iter()
                .map(move |period| PreferenceKey { cell, period })
        })
    }

    /// Store key, e.g. `level_driving` or `level_night_still`.
    pub fn as_str(&self) -> &'static str {
        use ActivityCell as C;
        use DayPeriod as P;

        match (self.cell, self.period) {
            (C::Driving, P::Day) => "level_driving",
            (C::OnBicycle, P::Day) => "level_on_bicycle",
            (C::Walking, P::Day) => "level_walking",
            (C::Running, P::Day) => "level_running",
            (C::Still, P::Day) => "level_still",
            (C::OnFoot, P::Day) => "level_on_foot",
            (C::Unknown, P::Day) => "level_unknown",
            (C::Driving, P::Night) => "level_night_driving",
            (C::OnBicycle, P::Night) => "level_night_on_bicycle",
            (C::Walking, P::Night) => "level_night_walking",
            (C::Running, P::Night) => "level_night_running",
            (C::Still, P::Night) => "level_night_still",
            (C::OnFoot, P::Night) => "level_night_on_foot",
            (C::Unknown, P::Night) => "level_night_unknown",
        }
    }

    /// Compiled-in level used when the store has nothing usable for this cell.
    pub fn default_level(&self) -> BrightnessLevel {
        use ActivityCell as C;
        use BrightnessLevel as L;
        use DayPeriod as P;

        match (self.cell, self.period) {
            (C::Driving, P::Day) => L::Highest,
            (C::OnBicycle, P::Day) => L::Highest,
            (C::Walking, P::Day) => L::Highest,
            (C::Running, P::Day) => L::Highest,
            (C::Still, P::Day) => L::Medium,
            (C::OnFoot, P::Day) => L::Highest,
            (C::Unknown, P::Day) => L::Medium,
            // Dark surroundings: dimmest unless configured otherwise.
            (_, P::Night) => L::Lowest,
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::all().find(|candidate| candidate.as_str() == key)
    }
}

impl fmt::Display for PreferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a resolved level came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelSource {
    Configured,
    Default,
}

/// Outcome of looking up one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub key: PreferenceKey,
    pub level: BrightnessLevel,
    pub source: LevelSource,
}

/// Resolve the configured level for an activity at the given time of day.
///
/// Never fails: a missing or unparsable stored value falls back to the
/// cell's compiled default.
pub fn resolve_level(
    store: &dyn PreferenceStore,
    activity: ActivityType,
    period: DayPeriod,
) -> Resolution {
    let key = PreferenceKey::new(activity, period);

    let configured = store.get(key.as_str()).and_then(|raw| {
        raw.parse::<BrightnessLevel>()
            .map_err(|e| {
                log_warning!("Ignoring preference {}: {}", key, e);
            })
            .ok()
    });

    match configured {
        Some(level) => Resolution {
            key,
            level,
            source: LevelSource::Configured,
        },
        None => Resolution {
            key,
            level: key.default_level(),
            source: LevelSource::Default,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_is_total_and_keys_unique() {
        let keys: HashSet<&str> = PreferenceKey::all().map(|k| k.as_str()).collect();
        assert_eq!(keys.len(), 14);

        for activity in ActivityType::ALL {
            for period in [DayPeriod::Day, DayPeriod::Night] {
                let key = PreferenceKey::new(activity, period);
                assert!(keys.contains(key.as_str()), "{activity} {period}");
                assert_eq!(PreferenceKey::from_key(key.as_str()), Some(key));
            }
        }
    }

    #[test]
    fn test_tilting_shares_on_foot_cells() {
        assert_eq!(
            PreferenceKey::new(ActivityType::Tilting, DayPeriod::Day).as_str(),
            "level_on_foot"
        );
        assert_eq!(
            PreferenceKey::new(ActivityType::Tilting, DayPeriod::Night).as_str(),
            "level_night_on_foot"
        );
    }

    #[test]
    fn test_unknown_code_resolves_to_unknown_cell() {
        let activity = ActivityType::from_code(99);
        assert_eq!(
            PreferenceKey::new(activity, DayPeriod::Day).as_str(),
            "level_unknown"
        );
    }

    #[test]
    fn test_defaults() {
        let store = MemoryStore::default();
        let day_driving = resolve_level(&store, ActivityType::InVehicle, DayPeriod::Day);
        assert_eq!(day_driving.level, BrightnessLevel::Highest);
        assert_eq!(day_driving.source, LevelSource::Default);

        let night_still = resolve_level(&store, ActivityType::Still, DayPeriod::Night);
        assert_eq!(night_still.key.as_str(), "level_night_still");
        assert_eq!(night_still.level, BrightnessLevel::Lowest);

        let day_still = resolve_level(&store, ActivityType::Still, DayPeriod::Day);
        assert_eq!(day_still.level, BrightnessLevel::Medium);
    }

    #[test]
    fn test_configured_value_wins() {
        let store = MemoryStore::from_pairs([("level_night_running", "medium_high")]);
        let resolved = resolve_level(&store, ActivityType::Running, DayPeriod::Night);
        assert_eq!(resolved.level, BrightnessLevel::MediumHigh);
        assert_eq!(resolved.source, LevelSource::Configured);
    }

    #[test]
    fn test_unparsable_value_falls_back() {
        crate::logger::Log::set_enabled(false);
        let store = MemoryStore::from_pairs([("level_walking", "blinding")]);
        let resolved = resolve_level(&store, ActivityType::Walking, DayPeriod::Day);
        assert_eq!(resolved.level, BrightnessLevel::Highest);
        assert_eq!(resolved.source, LevelSource::Default);
    }
}
