//! # Wearlux Library
//!
//! Internal library for the wearlux binary.
//!
//! This library exists to enable testing of the decision internals and to
//! keep CLI dispatch (main.rs) separate from application logic.
//!
//! ## Architecture
//!
//! - **Signals**: `activity` for detected activities, `signal` for location
//!   fixes and light samples, `events` for parsing host events
//! - **Day/night**: `geo` for the sun-elevation window, `ambient` for
//!   debounced light sampling and the lux classifier
//! - **Levels**: `brightness` for the level scale and wire message,
//!   `preferences` for the per-activity level table
//! - **Decisions**: `engine` for the decision cycle and its drivers,
//!   `channel` for the transmission seam, `service` for the daemon loop
//! - **Infrastructure**: configuration, signal handling, logging and the
//!   time source abstraction

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod logger;

pub mod activity;
pub mod ambient;
pub mod args;
pub mod brightness;
pub mod channel;
pub mod config;
pub mod constants;
pub mod engine;
pub mod events;
pub mod geo;
pub mod preferences;
pub mod service;
pub mod signal;
pub mod signals;
pub mod time_source;
