//! Time source abstraction for real and simulated clocks.
//!
//! Decision cycles and light sessions read "now" through a [`TimeSource`]
//! handed to them at construction, so tests and the `--at` command line
//! option can pin the clock. A process-wide source is also kept for the
//! logger's timestamp prefix.

use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone};
use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

static TIME_SOURCE: OnceCell<Arc<dyn TimeSource>> = OnceCell::new();

/// Trait for abstracting time operations
pub trait TimeSource: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Local>;

    /// Sleep for the specified duration (or simulate it)
    fn sleep(&self, duration: StdDuration);

    /// Check if this is a simulated time source
    fn is_simulated(&self) -> bool;
}

/// Wall-clock implementation.
pub struct RealTimeSource;

impl TimeSource for RealTimeSource {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&self, duration: StdDuration) {
        std::thread::sleep(duration);
    }

    fn is_simulated(&self) -> bool {
        false
    }
}

/// Manually driven clock.
///
/// Starts at a fixed instant and only moves when [`ManualTimeSource::advance`]
/// or [`TimeSource::sleep`] is called. Sleeping never blocks.
pub struct ManualTimeSource {
    current: Mutex<DateTime<Local>>,
}

impl ManualTimeSource {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, duration: StdDuration) {
        let step = ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::zero());
        let mut guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *guard += step;
    }

    /// Jump to an absolute instant.
    pub fn set(&self, instant: DateTime<Local>) {
        let mut guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *guard = instant;
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Local> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sleep(&self, duration: StdDuration) {
        self.advance(duration);
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Initialize the global time source (call once at startup)
pub fn init_time_source(source: Arc<dyn TimeSource>) {
    TIME_SOURCE.set(source).ok();
}

/// Check if the time source has been initialized
pub fn is_initialized() -> bool {
    TIME_SOURCE.get().is_some()
}

/// The process-wide source, defaulting to the real clock.
pub fn global() -> Arc<dyn TimeSource> {
    TIME_SOURCE
        .get_or_init(|| Arc::new(RealTimeSource))
        .clone()
}

/// Get the current time from the global time source
pub fn now() -> DateTime<Local> {
    global().now()
}

/// Check if we're running in simulation mode
pub fn is_simulated() -> bool {
    global().is_simulated()
}

/// Parse a datetime string in the format "YYYY-MM-DD HH:MM:SS" as local time.
pub fn parse_datetime(s: &str) -> Result<DateTime<Local>, String> {
    use chrono::NaiveDateTime;

    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| format!("Invalid datetime format: {e}. Use YYYY-MM-DD HH:MM:SS"))?;

    Local
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| "Ambiguous or invalid local time".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_source_advances_on_sleep() {
        let start = parse_datetime("2024-06-21 12:00:00").unwrap();
        let clock = ManualTimeSource::new(start);

        clock.sleep(StdDuration::from_secs(90));
        assert_eq!(clock.now(), start + ChronoDuration::seconds(90));

        clock.advance(StdDuration::from_millis(500));
        assert_eq!(clock.now(), start + ChronoDuration::milliseconds(90_500));
        assert!(clock.is_simulated());
    }

    #[test]
    fn test_parse_datetime_rejects_bad_format() {
        assert!(parse_datetime("2024-06-21T12:00").is_err());
        assert!(parse_datetime("21/06/2024 12:00:00").is_err());
    }
}
