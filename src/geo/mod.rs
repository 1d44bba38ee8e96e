//! Day/night boundary computation.
//!
//! - [`solar`]: sun-elevation based daytime window and the `is_daytime` check
//! - [`display`]: formatting of windows for the command line

pub mod display;
pub mod solar;

pub use display::log_solar_window;
pub use solar::{SolarTimes, SunAngles, calculate_solar_times, is_daytime};
