//! Decision engine: joins asynchronous signals into one brightness decision.
//!
//! A [`DecisionCycle`] holds two slots, the detected activity and a
//! corroborating signal (a location fix or an ambient light sample,
//! depending on the configured day/night source). Whichever slot is filled
//! second triggers the decision; neither has priority. The resolved level is
//! sent at once if the channel is connected, otherwise it waits as the single
//! pending transmission and is flushed when the connection comes up. After a
//! send the channel is closed and the cycle is done.
//!
//! ```text
//! AwaitingSignals ──both slots──▶ Ready ──▶ Dispatching ──sent / failed──▶ Done
//! ```
//!
//! The cycle itself is single-threaded and must be fed events one at a
//! time. [`runner`] adds the deadline and reconnect policies on top.

pub mod runner;

pub use runner::{
    CycleDriver, CycleHandle, CycleOutcome, CycleSettings, EventPoster, RetryPolicy, run_cycle,
    spawn_cycle,
};

use anyhow::Result;
use chrono_tz::Tz;
use std::sync::{Arc, Mutex};

use crate::activity::{ActivityType, DetectedActivity};
use crate::ambient::DaylightClassifier;
use crate::brightness::{BrightnessLevel, BrightnessMessage};
use crate::channel::{ChannelEvent, ChannelNotifier, TransmissionChannel};
use crate::config::{Config, DayNightSource};
use crate::geo::solar::{SunAngles, is_daytime};
use crate::preferences::{DayPeriod, LevelSource, PreferenceStore, Resolution, resolve_level};
use crate::signal::Corroborator;
use crate::time_source::TimeSource;

/// Everything a cycle needs that outlives the cycle itself.
pub struct DecisionContext {
    pub store: Arc<dyn PreferenceStore>,
    pub source: DayNightSource,
    pub angles: SunAngles,
    /// Zone used to pick the calendar date. `None` means system local time.
    pub timezone: Option<Tz>,
    /// Shared across cycles so the lux hysteresis survives between decisions.
    pub classifier: Mutex<DaylightClassifier>,
    pub clock: Arc<dyn TimeSource>,
}

impl DecisionContext {
    pub fn from_config(
        config: &Config,
        store: Arc<dyn PreferenceStore>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        Ok(Self {
            store,
            source: config.daynight_source(),
            angles: config.sun_angles(),
            timezone: config.timezone()?,
            classifier: Mutex::new(config.daylight_classifier()),
            clock,
        })
    }
}

/// Lifecycle of one decision cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    AwaitingSignals,
    Ready,
    Dispatching,
    Done,
}

/// Input to a decision cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleEvent {
    Activity(DetectedActivity),
    Corroborator(Corroborator),
    Channel(ChannelEvent),
    /// The signal deadline expired.
    Deadline,
    /// Stop without deciding.
    Shutdown,
}

/// A computed decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub activity: ActivityType,
    pub period: DayPeriod,
    pub resolution: Resolution,
}

impl Decision {
    pub fn level(&self) -> BrightnessLevel {
        self.resolution.level
    }
}

/// What the driver of the cycle has to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// Connection failed and a retry is allowed.
    Reconnect,
    Finished,
}

/// The two slots a decision waits on. Latest value wins in each.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalSlots {
    pub activity: Option<DetectedActivity>,
    pub corroborator: Option<Corroborator>,
}

/// One decision cycle.
pub struct DecisionCycle {
    context: Arc<DecisionContext>,
    channel: Box<dyn TransmissionChannel>,
    state: CycleState,
    slots: SignalSlots,
    pending: Option<BrightnessLevel>,
    last_decision: Option<Decision>,
    sent: Option<BrightnessLevel>,
    connect_attempts: u32,
    max_retries: u32,
}

impl DecisionCycle {
    /// A seeded corroborator the configured day/night source does not use is
    /// dropped, the same as one arriving later.
    pub fn new(
        context: Arc<DecisionContext>,
        channel: Box<dyn TransmissionChannel>,
        mut seed: SignalSlots,
        max_retries: u32,
    ) -> Self {
        if let Some(corroborator) = seed.corroborator
            && !source_accepts(context.source, &corroborator)
        {
            log_debug!(
                "Ignoring {} in {} mode",
                corroborator.describe(),
                context.source.as_str()
            );
            seed.corroborator = None;
        }

        Self {
            context,
            channel,
            state: CycleState::AwaitingSignals,
            slots: seed,
            pending: None,
            last_decision: None,
            sent: None,
            connect_attempts: 0,
            max_retries,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn slots(&self) -> &SignalSlots {
        &self.slots
    }

    pub fn pending(&self) -> Option<BrightnessLevel> {
        self.pending
    }

    pub fn last_decision(&self) -> Option<Decision> {
        self.last_decision
    }

    /// Level actually handed to the channel, if any.
    pub fn sent(&self) -> Option<BrightnessLevel> {
        self.sent
    }

    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts
    }

    /// Open the channel and decide right away if the seed already fills both slots.
    pub fn start(&mut self, notify: ChannelNotifier) -> Step {
        let retry = self.connect(notify);
        self.try_decide();
        if retry && self.state != CycleState::Done {
            return Step::Reconnect;
        }
        self.step()
    }

    /// Retry the connection after a failure.
    pub fn reconnect(&mut self, notify: ChannelNotifier) -> Step {
        if self.state != CycleState::Done && self.connect(notify) {
            return Step::Reconnect;
        }
        self.step()
    }

    /// Returns true when a synchronous failure should be retried.
    fn connect(&mut self, notify: ChannelNotifier) -> bool {
        self.connect_attempts += 1;
        match self.channel.connect(notify) {
            Ok(()) => false,
            Err(e) => self.on_connection_failed(&format!("{e:#}")),
        }
    }

    fn step(&self) -> Step {
        if self.state == CycleState::Done {
            Step::Finished
        } else {
            Step::Continue
        }
    }

    pub fn handle(&mut self, event: CycleEvent) -> Step {
        match event {
            CycleEvent::Activity(detected) => {
                log_debug!(
                    "Activity: {} ({}% confidence)",
                    detected.activity,
                    detected.confidence
                );
                self.slots.activity = Some(detected);
                self.try_decide();
            }
            CycleEvent::Corroborator(corroborator) => {
                if !self.accepts(&corroborator) {
                    log_debug!(
                        "Ignoring {} in {} mode",
                        corroborator.describe(),
                        self.context.source.as_str()
                    );
                } else {
                    log_debug!("Corroborated by {}", corroborator.describe());
                    self.slots.corroborator = Some(corroborator);
                    self.try_decide();
                }
            }
            CycleEvent::Channel(ChannelEvent::Connected) => self.on_connected(),
            CycleEvent::Channel(ChannelEvent::Failed(reason)) => {
                if self.on_connection_failed(&reason) {
                    return Step::Reconnect;
                }
            }
            CycleEvent::Deadline => self.on_deadline(),
            CycleEvent::Shutdown => {
                if self.state != CycleState::Done {
                    log_debug!("Decision cycle stopped before completion");
                    self.finish();
                }
            }
        }
        self.step()
    }

    fn accepts(&self, corroborator: &Corroborator) -> bool {
        source_accepts(self.context.source, corroborator)
    }

    fn try_decide(&mut self) {
        if !matches!(
            self.state,
            CycleState::AwaitingSignals | CycleState::Dispatching
        ) {
            return;
        }
        let Some(detected) = self.slots.activity else {
            return;
        };
        if self.slots.corroborator.is_none() {
            return;
        }

        self.state = CycleState::Ready;
        let decision = self.decide(detected.activity);
        self.dispatch(decision);
    }

    /// Resolve the level for an activity using whatever corroborator is held.
    fn decide(&mut self, activity: ActivityType) -> Decision {
        let period = self.day_period();
        let resolution = resolve_level(self.context.store.as_ref(), activity, period);

        log_decorated!(
            "Decided {} for {} at {} ({})",
            resolution.level,
            activity,
            period,
            match resolution.source {
                LevelSource::Configured => format!("configured {}", resolution.key),
                LevelSource::Default => format!("default {}", resolution.key),
            }
        );

        let decision = Decision {
            activity,
            period,
            resolution,
        };
        self.last_decision = Some(decision);
        decision
    }

    fn day_period(&self) -> DayPeriod {
        match self.slots.corroborator {
            Some(Corroborator::AmbientLight(sample)) => self
                .context
                .classifier
                .lock()
                .map(|mut classifier| classifier.classify(sample.lux))
                .unwrap_or(DayPeriod::Day),
            Some(Corroborator::Location(fix)) => {
                let now = self.context.clock.now();
                let day = match self.context.timezone {
                    Some(tz) => is_daytime(Some(&fix), &now.with_timezone(&tz), self.context.angles),
                    None => is_daytime(Some(&fix), &now, self.context.angles),
                };
                DayPeriod::from_is_day(day)
            }
            None => DayPeriod::Day,
        }
    }

    fn dispatch(&mut self, decision: Decision) {
        let level = decision.level();
        self.state = CycleState::Dispatching;

        if self.channel.is_connected() {
            self.send_and_close(level);
        } else {
            if let Some(previous) = self.pending.replace(level) {
                log_debug!("Pending {} replaced by {}", previous, level);
            } else {
                log_debug!("Channel not connected yet, holding {}", level);
            }
        }
    }

    fn on_connected(&mut self) {
        if self.state == CycleState::Done {
            return;
        }
        if let Some(level) = self.pending.take() {
            self.send_and_close(level);
        }
    }

    /// Returns true when the caller should retry the connection.
    fn on_connection_failed(&mut self, reason: &str) -> bool {
        if self.state == CycleState::Done {
            return false;
        }
        if self.connect_attempts <= self.max_retries {
            log_warning!(
                "Connection to {} failed (attempt {}): {}",
                self.channel.name(),
                self.connect_attempts,
                reason
            );
            return true;
        }

        log_error!("Connection to {} failed: {}", self.channel.name(), reason);
        if let Some(level) = self.pending.take() {
            log_indented!("Dropping decision {}", level);
        }
        self.finish();
        false
    }

    fn on_deadline(&mut self) {
        if self.state != CycleState::AwaitingSignals {
            return;
        }
        match self.slots.activity {
            Some(detected) => {
                log_warning!("No corroborating signal in time, assuming daytime");
                self.state = CycleState::Ready;
                let period = DayPeriod::Day;
                let resolution =
                    resolve_level(self.context.store.as_ref(), detected.activity, period);
                let decision = Decision {
                    activity: detected.activity,
                    period,
                    resolution,
                };
                log_decorated!("Decided {} for {} (deadline)", resolution.level, detected.activity);
                self.last_decision = Some(decision);
                self.dispatch(decision);
            }
            None => {
                log_warning!("No activity detected in time, abandoning decision");
                self.finish();
            }
        }
    }

    fn send_and_close(&mut self, level: BrightnessLevel) {
        let message = BrightnessMessage::new(level);
        match self.channel.send(&message) {
            Ok(()) => {
                log_decorated!(
                    "Sent {} (ordinal {}) to {}",
                    level,
                    level.ordinal(),
                    message.path()
                );
                self.sent = Some(level);
            }
            Err(e) => log_error!("Sending {} failed: {:#}", level, e),
        }
        self.finish();
    }

    fn finish(&mut self) {
        self.pending = None;
        self.channel.disconnect();
        self.state = CycleState::Done;
    }
}

fn source_accepts(source: DayNightSource, corroborator: &Corroborator) -> bool {
    matches!(
        (source, corroborator),
        (DayNightSource::Location, Corroborator::Location(_))
            | (DayNightSource::AmbientLight, Corroborator::AmbientLight(_))
    )
}

impl Drop for DecisionCycle {
    fn drop(&mut self) {
        if self.channel.is_connected() {
            self.channel.disconnect();
        }
    }
}
