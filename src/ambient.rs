//! Ambient light debouncing across screen sessions.
//!
//! While the screen is on the light sensor streams readings. Only one
//! representative value per screen session is wanted, and the raw stream is
//! unreliable at both ends of a session:
//!
//! - The screen-off event arrives roughly one sampling interval late, so the
//!   newest readings are often already darkened by a pocket or sleeve. The
//!   session therefore keeps a value from two sampling ticks ago. Ticks are
//!   at least half a `value_delay` apart.
//! - A very short session may not have two ticks worth of history. Sessions
//!   shorter than `min_screen_time` report the brightest reading seen
//!   instead, since under-brightening is the worse error.
//!
//! A [`LightSession`] is created at screen-on and consumed at screen-off, so
//! no state carries over between sessions.

use chrono::{DateTime, Local};
use std::time::Duration;

use crate::preferences::DayPeriod;
use crate::signal::LightSample;

/// Timing parameters for light sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerSettings {
    pub value_delay: Duration,
    pub min_screen_time: Duration,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            value_delay: Duration::from_millis(crate::constants::DEFAULT_VALUE_DELAY_MS),
            min_screen_time: Duration::from_millis(crate::constants::DEFAULT_MIN_SCREEN_TIME_MS),
        }
    }
}

impl SamplerSettings {
    fn tick_interval(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.value_delay / 2).unwrap_or(chrono::Duration::zero())
    }

    fn min_screen_time(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.min_screen_time).unwrap_or(chrono::Duration::MAX)
    }
}

/// Debounce state for one screen-on session.
#[derive(Debug, Clone)]
pub struct LightSession {
    settings: SamplerSettings,
    started_at: DateTime<Local>,
    last_value: Option<f32>,
    previous_value: Option<f32>,
    running_max: Option<f32>,
    last_update: Option<DateTime<Local>>,
    readings: usize,
}

impl LightSession {
    pub fn start(settings: SamplerSettings, at: DateTime<Local>) -> Self {
        Self {
            settings,
            started_at: at,
            last_value: None,
            previous_value: None,
            running_max: None,
            last_update: None,
            readings: 0,
        }
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn readings(&self) -> usize {
        self.readings
    }

    /// Feed one raw reading. The first reading of a session always ticks.
    pub fn record(&mut self, sample: LightSample) {
        self.readings += 1;
        self.running_max = Some(self.running_max.map_or(sample.lux, |max| max.max(sample.lux)));

        let due = match self.last_update {
            None => true,
            Some(last) => sample.observed_at - last >= self.settings.tick_interval(),
        };

        if due {
            self.previous_value = self.last_value;
            self.last_value = Some(sample.lux);
            self.last_update = Some(sample.observed_at);
        }
    }

    /// End the session and pick its representative reading.
    ///
    /// Returns `None` when no reading was recorded.
    pub fn finish(self, at: DateTime<Local>) -> Option<LightSample> {
        let running_max = self.running_max?;

        let lux = if at - self.started_at < self.settings.min_screen_time() {
            running_max
        } else {
            self.previous_value.or(self.last_value).unwrap_or(running_max)
        };

        Some(LightSample::new(lux, at))
    }
}

/// Tracks screen state and owns the current light session.
#[derive(Debug)]
pub struct ScreenMonitor {
    settings: SamplerSettings,
    sensor_available: bool,
    reported_missing: bool,
    session: Option<LightSession>,
}

impl ScreenMonitor {
    pub fn new(settings: SamplerSettings, sensor_available: bool) -> Self {
        Self {
            settings,
            sensor_available,
            reported_missing: false,
            session: None,
        }
    }

    pub fn sensor_available(&self) -> bool {
        self.sensor_available
    }

    pub fn is_sampling(&self) -> bool {
        self.session.is_some()
    }

    fn report_missing_sensor(&mut self) {
        if !self.reported_missing {
            log_pipe!();
            log_warning!("No ambient light sensor available");
            log_indented!("Light-based brightness is disabled for this run");
            self.reported_missing = true;
        }
    }

    /// Screen turned on. `display_on` is false for interactive wakes that
    /// leave the display dark; those do not start a session.
    pub fn screen_on(&mut self, at: DateTime<Local>, display_on: bool) {
        if !self.sensor_available {
            self.report_missing_sensor();
            return;
        }
        if !display_on {
            log_debug!("Wake without display, not sampling");
            return;
        }
        if let Some(stale) = self.session.take() {
            log_debug!(
                "Discarding unfinished light session from {} ({} readings)",
                stale.started_at().format("%H:%M:%S"),
                stale.readings()
            );
        }
        self.session = Some(LightSession::start(self.settings, at));
    }

    pub fn light(&mut self, sample: LightSample) {
        if let Some(session) = self.session.as_mut() {
            session.record(sample);
        }
    }

    /// Screen turned off. Yields the session's representative reading, if any.
    pub fn screen_off(&mut self, at: DateTime<Local>) -> Option<LightSample> {
        let session = self.session.take()?;
        let readings = session.readings();
        let sample = session.finish(at);
        match &sample {
            Some(s) => log_debug!("Screen session ended: {:.1} lx from {} readings", s.lux, readings),
            None => log_debug!("Screen session ended without light readings"),
        }
        sample
    }
}

/// Day/night from lux with hysteresis.
///
/// Readings above `high` switch to day, readings below `low` switch to night,
/// anything in between keeps the previous classification. The initial
/// classification is day.
#[derive(Debug, Clone)]
pub struct DaylightClassifier {
    high: f32,
    low: f32,
    is_day: bool,
}

impl DaylightClassifier {
    pub fn new(high: f32, low: f32) -> Self {
        Self {
            high,
            low,
            is_day: true,
        }
    }

    pub fn classify(&mut self, lux: f32) -> DayPeriod {
        if !self.is_day && lux > self.high {
            self.is_day = true;
        } else if self.is_day && lux < self.low {
            self.is_day = false;
        }
        DayPeriod::from_is_day(self.is_day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 6, 21, 12, 0, 0).unwrap()
    }

    fn at_ms(ms: i64) -> DateTime<Local> {
        t0() + chrono::Duration::milliseconds(ms)
    }

    fn reading(ms: i64, lux: f32) -> LightSample {
        LightSample::new(lux, at_ms(ms))
    }

    #[test]
    fn test_long_session_uses_value_two_ticks_back() {
        let mut session = LightSession::start(SamplerSettings::default(), t0());
        for (i, lux) in [100.0, 200.0, 300.0, 400.0, 500.0].into_iter().enumerate() {
            session.record(reading(i as i64 * 3_000, lux));
        }
        let sample = session.finish(at_ms(13_000)).unwrap();
        assert_eq!(sample.lux, 400.0);
        assert_eq!(sample.observed_at, at_ms(13_000));
    }

    #[test]
    fn test_pocket_darkening_is_ignored() {
        let mut session = LightSession::start(SamplerSettings::default(), t0());
        for second in 0..12 {
            session.record(reading(second * 1_000, 800.0));
        }
        // Covered just before the screen-off event is noticed.
        session.record(reading(12_000, 0.0));
        session.record(reading(12_500, 0.0));

        let sample = session.finish(at_ms(12_600)).unwrap();
        assert_eq!(sample.lux, 800.0);
    }

    #[test]
    fn test_readings_inside_tick_interval_do_not_shift() {
        let mut session = LightSession::start(SamplerSettings::default(), t0());
        session.record(reading(0, 10.0));
        session.record(reading(1_000, 20.0));
        session.record(reading(2_000, 30.0));
        session.record(reading(2_500, 40.0));
        // Ticks at 0 ms (10) and 2500 ms (40); previous is 10.
        let sample = session.finish(at_ms(11_000)).unwrap();
        assert_eq!(sample.lux, 10.0);
    }

    #[test]
    fn test_single_tick_long_session_uses_last_value() {
        let mut session = LightSession::start(SamplerSettings::default(), t0());
        session.record(reading(0, 55.0));
        session.record(reading(1_000, 75.0));
        let sample = session.finish(at_ms(20_000)).unwrap();
        assert_eq!(sample.lux, 55.0);
    }

    #[test]
    fn test_short_session_uses_running_max() {
        let mut session = LightSession::start(SamplerSettings::default(), t0());
        session.record(reading(0, 50.0));
        session.record(reading(3_000, 300.0));
        session.record(reading(6_000, 20.0));
        let sample = session.finish(at_ms(7_000)).unwrap();
        assert_eq!(sample.lux, 300.0);
    }

    #[test]
    fn test_session_without_readings_emits_nothing() {
        let session = LightSession::start(SamplerSettings::default(), t0());
        assert!(session.finish(at_ms(30_000)).is_none());
    }

    #[test]
    fn test_monitor_resets_on_screen_on() {
        let mut monitor = ScreenMonitor::new(SamplerSettings::default(), true);
        monitor.screen_on(t0(), true);
        monitor.light(reading(0, 900.0));

        // Screen-off was missed; a new session must not see the old reading.
        monitor.screen_on(at_ms(60_000), true);
        monitor.light(reading(61_000, 40.0));
        let sample = monitor.screen_off(at_ms(62_000)).unwrap();
        assert_eq!(sample.lux, 40.0);
        assert!(!monitor.is_sampling());
    }

    #[test]
    fn test_monitor_ignores_dark_wake_and_missing_sensor() {
        crate::logger::Log::set_enabled(false);
        let mut monitor = ScreenMonitor::new(SamplerSettings::default(), true);
        monitor.screen_on(t0(), false);
        monitor.light(reading(100, 500.0));
        assert!(monitor.screen_off(at_ms(200)).is_none());

        let mut blind = ScreenMonitor::new(SamplerSettings::default(), false);
        blind.screen_on(t0(), true);
        blind.light(reading(100, 500.0));
        assert!(blind.screen_off(at_ms(20_000)).is_none());
        assert!(!blind.sensor_available());
    }

    #[test]
    fn test_classifier_hysteresis() {
        let mut classifier = DaylightClassifier::new(400.0, 150.0);
        assert_eq!(classifier.classify(300.0), DayPeriod::Day);
        assert_eq!(classifier.classify(100.0), DayPeriod::Night);
        assert_eq!(classifier.classify(300.0), DayPeriod::Night);
        assert_eq!(classifier.classify(401.0), DayPeriod::Day);
        assert_eq!(classifier.classify(151.0), DayPeriod::Day);
    }

    proptest! {
        #[test]
        fn test_output_is_one_of_the_readings(
            values in proptest::collection::vec(0.0f32..10_000.0, 1..40),
            gap_ms in 100i64..4_000,
            tail_ms in 0i64..20_000,
        ) {
            let mut session = LightSession::start(SamplerSettings::default(), t0());
            for (i, lux) in values.iter().enumerate() {
                session.record(reading(i as i64 * gap_ms, *lux));
            }
            let end = at_ms((values.len() as i64 - 1) * gap_ms + tail_ms);
            let sample = session.finish(end).unwrap();
            prop_assert!(values.contains(&sample.lux));
            let max = values.iter().cloned().fold(0.0f32, f32::max);
            prop_assert!(sample.lux <= max);
        }
    }
}
