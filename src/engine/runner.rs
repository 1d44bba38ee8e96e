//! Drivers for a [`DecisionCycle`].
//!
//! [`CycleDriver`] wraps a cycle with the two policies the cycle itself does
//! not know about: the signal deadline and the reconnect backoff. Whoever
//! owns the driver must feed it events one at a time; connection outcomes
//! come back through the poster it was given.
//!
//! The driver never blocks. A failed connection only schedules the next
//! attempt on the context clock; the owner asks [`CycleDriver::time_to_retry`]
//! and calls [`CycleDriver::retry`] once it is due, the same way it watches
//! the deadline.
//!
//! Two ready-made owners exist: [`run_cycle`] drives one cycle on the
//! calling thread, [`spawn_cycle`] on a dedicated thread behind an mpsc
//! queue that any signal source may post to. Both sleep through the backoff.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Local};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{CycleEvent, CycleState, Decision, DecisionContext, DecisionCycle, SignalSlots, Step};
use crate::brightness::BrightnessLevel;
use crate::channel::{ChannelNotifier, TransmissionChannel};
use crate::constants::MAXIMUM_RETRY_BACKOFF_MS;

/// Bounded reconnect with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// No retries: a failed connection drops the decision.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_backoff: Duration::ZERO,
        }
    }

    /// Delay before the retry that follows `failed_attempts` failures.
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        let delay = self.base_backoff.saturating_mul(1 << exponent);
        delay.min(Duration::from_millis(MAXIMUM_RETRY_BACKOFF_MS))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleSettings {
    /// How long to wait for both slots. `None` waits forever.
    pub signal_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

/// Result of a finished cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Last decision computed, sent or not.
    pub decision: Option<Decision>,
    /// Level handed to the channel.
    pub sent: Option<BrightnessLevel>,
    pub connect_attempts: u32,
}

/// Where connection outcomes are posted back to.
pub type EventPoster = Arc<dyn Fn(CycleEvent) + Send + Sync>;

/// One cycle plus its deadline and reconnect policy.
pub struct CycleDriver {
    cycle: DecisionCycle,
    post: EventPoster,
    settings: CycleSettings,
    deadline: Option<Instant>,
    /// When the next reconnect is due, on the context clock.
    retry_at: Option<DateTime<Local>>,
    context: Arc<DecisionContext>,
}

impl CycleDriver {
    /// Create the cycle and open its channel.
    pub fn start(
        context: Arc<DecisionContext>,
        channel: Box<dyn TransmissionChannel>,
        seed: SignalSlots,
        settings: CycleSettings,
        post: EventPoster,
    ) -> Self {
        let cycle = DecisionCycle::new(
            Arc::clone(&context),
            channel,
            seed,
            settings.retry.max_retries,
        );
        let mut driver = Self {
            cycle,
            post,
            settings,
            deadline: settings.signal_timeout.map(|t| Instant::now() + t),
            retry_at: None,
            context,
        };
        let notify = driver.notifier();
        let step = driver.cycle.start(notify);
        driver.settle(step);
        driver
    }

    fn notifier(&self) -> ChannelNotifier {
        let post = Arc::clone(&self.post);
        Box::new(move |event| post(CycleEvent::Channel(event)))
    }

    /// Schedule the next reconnect when the cycle asks for one.
    fn settle(&mut self, step: Step) {
        match step {
            Step::Reconnect => {
                let delay = self.settings.retry.backoff(self.cycle.connect_attempts());
                log_indented!("Reconnecting in {}ms", delay.as_millis());
                let delay = ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::zero());
                self.retry_at = Some(self.context.clock.now() + delay);
            }
            Step::Finished => self.retry_at = None,
            Step::Continue => {}
        }
    }

    pub fn apply(&mut self, event: CycleEvent) {
        let step = self.cycle.handle(event);
        self.settle(step);
    }

    /// Make the scheduled reconnect attempt. Does nothing when none is due.
    pub fn retry(&mut self) {
        if self.retry_at.take().is_none() || self.is_done() {
            return;
        }
        let notify = self.notifier();
        let step = self.cycle.reconnect(notify);
        self.settle(step);
    }

    /// Sleep on the context clock until the scheduled reconnect, then make it.
    pub fn wait_and_retry(&mut self) {
        if let Some(remaining) = self.time_to_retry() {
            self.context.clock.sleep(remaining);
        }
        self.retry();
    }

    /// Time left until the scheduled reconnect. `None` when none is scheduled.
    pub fn time_to_retry(&self) -> Option<Duration> {
        if self.is_done() {
            return None;
        }
        let retry_at = self.retry_at?;
        Some(
            (retry_at - self.context.clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO),
        )
    }

    pub fn is_done(&self) -> bool {
        self.cycle.state() == CycleState::Done
    }

    pub fn cycle(&self) -> &DecisionCycle {
        &self.cycle
    }

    /// Time left until the deadline fires. `None` when no deadline applies.
    pub fn time_to_deadline(&self) -> Option<Duration> {
        if self.cycle.state() != CycleState::AwaitingSignals {
            return None;
        }
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn outcome(&self) -> CycleOutcome {
        CycleOutcome {
            decision: self.cycle.last_decision(),
            sent: self.cycle.sent(),
            connect_attempts: self.cycle.connect_attempts(),
        }
    }
}

/// Feed queued events to the driver until its cycle is done.
fn drive(driver: &mut CycleDriver, events: &Receiver<CycleEvent>) {
    while !driver.is_done() {
        if driver.time_to_retry().is_some() {
            driver.wait_and_retry();
            continue;
        }
        let event = match driver.time_to_deadline() {
            Some(remaining) => match events.recv_timeout(remaining) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => CycleEvent::Deadline,
                Err(RecvTimeoutError::Disconnected) => CycleEvent::Shutdown,
            },
            None => events.recv().unwrap_or(CycleEvent::Shutdown),
        };
        driver.apply(event);
    }
}

fn queue_poster(sender: &Sender<CycleEvent>) -> EventPoster {
    let sender = sender.clone();
    Arc::new(move |event| {
        // The cycle may already be gone; a late report is moot.
        let _ = sender.send(event);
    })
}

/// Handle to a cycle running on its own thread.
pub struct CycleHandle {
    sender: Sender<CycleEvent>,
    thread: JoinHandle<CycleOutcome>,
}

impl CycleHandle {
    /// Queue an event. Returns false when the cycle thread has exited.
    pub fn post(&self, event: CycleEvent) -> bool {
        !self.thread.is_finished() && self.sender.send(event).is_ok()
    }

    pub fn sender(&self) -> Sender<CycleEvent> {
        self.sender.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the cycle to end on its own.
    pub fn join(self) -> Result<CycleOutcome> {
        self.thread
            .join()
            .map_err(|_| anyhow::anyhow!("Decision cycle thread panicked"))
    }

    /// Stop the cycle if still running and collect its outcome.
    pub fn shutdown(self) -> Result<CycleOutcome> {
        let _ = self.sender.send(CycleEvent::Shutdown);
        self.join()
    }
}

/// Start a cycle on a dedicated thread.
pub fn spawn_cycle(
    context: Arc<DecisionContext>,
    channel: Box<dyn TransmissionChannel>,
    seed: SignalSlots,
    settings: CycleSettings,
) -> Result<CycleHandle> {
    let (sender, events) = mpsc::channel();
    let post = queue_poster(&sender);
    let thread = thread::Builder::new()
        .name("decision-cycle".to_string())
        .spawn(move || {
            let mut driver = CycleDriver::start(context, channel, seed, settings, post);
            drive(&mut driver, &events);
            driver.outcome()
        })
        .context("Failed to spawn decision cycle thread")?;
    Ok(CycleHandle { sender, thread })
}

/// Run one cycle to completion on the calling thread.
///
/// A slot the seed leaves empty, or fills with a signal the day/night source
/// does not use, is treated as never arriving: the cycle goes straight to its
/// deadline handling.
pub fn run_cycle(
    context: Arc<DecisionContext>,
    channel: Box<dyn TransmissionChannel>,
    seed: SignalSlots,
    settings: CycleSettings,
) -> CycleOutcome {
    let (sender, events) = mpsc::channel();
    let mut driver = CycleDriver::start(context, channel, seed, settings, queue_poster(&sender));
    let slots = driver.cycle().slots();
    if slots.activity.is_none() || slots.corroborator.is_none() {
        let _ = sender.send(CycleEvent::Deadline);
    }
    drive(&mut driver, &events);
    driver.outcome()
}
