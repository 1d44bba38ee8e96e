//! Long-running wiring between host events and decision cycles.
//!
//! The service is a single-threaded actor: host events and channel
//! connection reports arrive on one queue and are applied in order, so a
//! cycle's slots are never touched concurrently.
//!
//! It keeps the latest known value of every signal. An activity detection
//! starts a fresh decision cycle seeded with the latest corroborator; in
//! ambient light mode a finished screen session does the same with the
//! latest activity. While a cycle is still running, new signals go into it
//! and simply update its slots.

use anyhow::Result;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use crate::activity::DetectedActivity;
use crate::ambient::ScreenMonitor;
use crate::channel::TransmissionChannel;
use crate::config::{Config, DayNightSource};
use crate::engine::{
    CycleDriver, CycleEvent, CycleOutcome, CycleSettings, DecisionContext, EventPoster,
    SignalSlots,
};
use crate::events::{ActivityRecognizer, HostEvent, ReaderMessage, parse_line};
use crate::preferences::PreferenceStore;
use crate::signal::{Corroborator, LightSample, LocationFix};
use crate::time_source::TimeSource;

/// Builds a fresh channel for every decision cycle.
pub type ChannelFactory = Box<dyn Fn() -> Box<dyn TransmissionChannel> + Send>;

/// Upper bound on how long the event loop blocks before checking the
/// running flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How many finished cycles are kept for the shutdown summary.
const RECENT_OUTCOMES: usize = 32;

/// What the service did over its lifetime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceSummary {
    /// Cycles that ran to completion or were stopped.
    pub finished: u64,
    /// Cycles that handed a level to the channel.
    pub sent: u64,
    /// The latest finished cycles, oldest first.
    pub recent: Vec<CycleOutcome>,
}

/// Everything the service queue carries.
#[derive(Debug)]
pub enum ServiceMessage {
    Input(ReaderMessage),
    /// Report for the cycle with the given id.
    Cycle { id: u64, event: CycleEvent },
}

impl From<ReaderMessage> for ServiceMessage {
    fn from(message: ReaderMessage) -> Self {
        ServiceMessage::Input(message)
    }
}

struct ActiveCycle {
    id: u64,
    driver: CycleDriver,
}

pub struct Service {
    context: Arc<DecisionContext>,
    settings: CycleSettings,
    channels: ChannelFactory,
    monitor: ScreenMonitor,
    sample_light: bool,
    activity_recognition: bool,
    detection_interval: Duration,
    latest_activity: Option<DetectedActivity>,
    latest_location: Option<LocationFix>,
    latest_light: Option<LightSample>,
    active: Option<ActiveCycle>,
    next_id: u64,
    finished: u64,
    sent: u64,
    recent: VecDeque<CycleOutcome>,
    sender: Sender<ServiceMessage>,
    messages: Receiver<ServiceMessage>,
}

impl Service {
    pub fn new(
        config: &Config,
        store: Arc<dyn PreferenceStore>,
        clock: Arc<dyn TimeSource>,
        channels: ChannelFactory,
    ) -> Result<Self> {
        let source = config.daynight_source();
        let context = Arc::new(DecisionContext::from_config(
            config,
            store,
            Arc::clone(&clock),
        )?);
        let (sender, messages) = mpsc::channel();

        Ok(Self {
            latest_location: config.fallback_location(clock.now()),
            context,
            settings: config.cycle_settings(),
            channels,
            monitor: ScreenMonitor::new(config.sampler_settings(), config.light_sensor()),
            sample_light: source == DayNightSource::AmbientLight && config.link_brightness(),
            activity_recognition: config.activity_recognition(),
            detection_interval: config.detection_interval(),
            latest_activity: None,
            latest_light: None,
            active: None,
            next_id: 0,
            finished: 0,
            sent: 0,
            recent: VecDeque::with_capacity(RECENT_OUTCOMES),
            sender,
            messages,
        })
    }

    /// Queue for input sources such as the event reader.
    pub fn sender(&self) -> Sender<ServiceMessage> {
        self.sender.clone()
    }

    /// Request activity updates and report missing capabilities.
    pub fn start(&mut self, recognizer: &mut dyn ActivityRecognizer) -> Result<()> {
        log_block_start!("Starting decision service");

        if self.activity_recognition {
            recognizer.request_updates(self.detection_interval)?;
            log_indented!(
                "Activity updates requested every {}s",
                self.detection_interval.as_secs()
            );
        } else {
            log_pipe!();
            log_warning!("No activity recognizer available");
            log_indented!("Decisions only fire when activity events arrive anyway");
        }

        if self.context.source == DayNightSource::AmbientLight && !self.sample_light {
            log_pipe!();
            log_warning!("Ambient light mode is selected but link_brightness is off");
            log_indented!("No light samples will be taken, decisions will wait for one");
        }

        if let Some(fix) = self.latest_location {
            log_indented!(
                "Using configured {} until a fix arrives",
                Corroborator::Location(fix).describe()
            );
        }
        Ok(())
    }

    pub fn handle(&mut self, event: HostEvent) -> Result<()> {
        match event {
            HostEvent::Activity(detected) => {
                self.latest_activity = Some(detected);
                if !self.forward(CycleEvent::Activity(detected)) {
                    self.start_cycle();
                }
            }
            HostEvent::Location(fix) => {
                self.latest_location = Some(fix);
                if self.context.source == DayNightSource::Location {
                    self.forward(CycleEvent::Corroborator(Corroborator::Location(fix)));
                }
            }
            HostEvent::ScreenOn { display_on } => {
                if self.sample_light {
                    self.monitor.screen_on(self.context.clock.now(), display_on);
                }
            }
            HostEvent::Light(sample) => self.monitor.light(sample),
            HostEvent::ScreenOff => {
                if let Some(sample) = self.monitor.screen_off(self.context.clock.now()) {
                    self.latest_light = Some(sample);
                    let event = CycleEvent::Corroborator(Corroborator::AmbientLight(sample));
                    if !self.forward(event) && self.latest_activity.is_some() {
                        self.start_cycle();
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply to the running cycle. Returns false when none is running.
    fn forward(&mut self, event: CycleEvent) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        active.driver.apply(event);
        self.reap();
        true
    }

    fn latest_corroborator(&self) -> Option<Corroborator> {
        self.context
            .source
            .select(self.latest_location, self.latest_light)
    }

    fn start_cycle(&mut self) {
        let id = self.next_id;
        self.next_id += 1;

        let seed = SignalSlots {
            activity: self.latest_activity,
            corroborator: self.latest_corroborator(),
        };
        log_debug!(
            "Decision cycle #{} (corroborator {})",
            id,
            seed.corroborator
                .map(|c| c.describe())
                .unwrap_or_else(|| "pending".to_string())
        );

        let sender = self.sender.clone();
        let post: EventPoster = Arc::new(move |event| {
            let _ = sender.send(ServiceMessage::Cycle { id, event });
        });
        let driver = CycleDriver::start(
            Arc::clone(&self.context),
            (self.channels)(),
            seed,
            self.settings,
            post,
        );
        self.active = Some(ActiveCycle { id, driver });
        self.reap();
    }

    /// Retire the running cycle once it is done.
    fn reap(&mut self) {
        if self.active.as_ref().is_some_and(|a| a.driver.is_done())
            && let Some(active) = self.active.take()
        {
            let outcome = active.driver.outcome();
            if outcome.sent.is_none() && outcome.decision.is_some() {
                log_debug!("Decision cycle #{} ended without sending", active.id);
            }
            self.record(outcome);
        }
    }

    fn record(&mut self, outcome: CycleOutcome) {
        self.finished += 1;
        if outcome.sent.is_some() {
            self.sent += 1;
        }
        if self.recent.len() == RECENT_OUTCOMES {
            self.recent.pop_front();
        }
        self.recent.push_back(outcome);
    }

    fn on_message(&mut self, message: ServiceMessage) -> Result<bool> {
        match message {
            ServiceMessage::Cycle { id, event } => {
                if self.active.as_ref().is_some_and(|a| a.id == id) {
                    self.forward(event);
                } else {
                    log_debug!("Ignoring report for retired cycle #{}", id);
                }
            }
            ServiceMessage::Input(ReaderMessage::Line(line)) => {
                match parse_line(&line, self.context.clock.now()) {
                    Ok(Some(event)) => self.handle(event)?,
                    Ok(None) => {}
                    Err(e) => log_warning!("{:#}", e),
                }
            }
            ServiceMessage::Input(ReaderMessage::Error(e)) => {
                log_error!("Failed to read events: {}", e);
                return Ok(false);
            }
            ServiceMessage::Input(ReaderMessage::Eof) => {
                log_debug!("End of event input");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Fire the running cycle's deadline or reconnect once due.
    fn check_timers(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active
            .driver
            .time_to_retry()
            .is_some_and(|remaining| remaining.is_zero())
        {
            active.driver.retry();
            self.reap();
        }

        let expired = self
            .active
            .as_ref()
            .and_then(|a| a.driver.time_to_deadline())
            .is_some_and(|remaining| remaining.is_zero());
        if expired {
            self.forward(CycleEvent::Deadline);
        }
    }

    /// How long the event loop may block before a timer needs attention.
    fn next_wakeup(&self) -> Duration {
        let Some(active) = self.active.as_ref() else {
            return POLL_INTERVAL;
        };
        [
            active.driver.time_to_deadline(),
            active.driver.time_to_retry(),
        ]
        .into_iter()
        .flatten()
        .fold(POLL_INTERVAL, Duration::min)
    }

    /// True while the running cycle waits out a reconnect backoff.
    pub fn retry_pending(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.driver.time_to_retry().is_some())
    }

    /// Apply queued messages without blocking.
    pub fn pump(&mut self) -> Result<bool> {
        while let Ok(message) = self.messages.try_recv() {
            if !self.on_message(message)? {
                return Ok(false);
            }
        }
        self.check_timers();
        Ok(true)
    }

    /// Process the queue until end of input or until `running` clears.
    pub fn run(&mut self, running: &AtomicBool) -> Result<()> {
        while running.load(Ordering::SeqCst) {
            match self.messages.recv_timeout(self.next_wakeup()) {
                Ok(message) => {
                    if !self.on_message(message)? {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.check_timers();
        }
        Ok(())
    }

    /// Stop any running cycle and summarise what the service did.
    pub fn shutdown(mut self) -> ServiceSummary {
        if self.active.is_some() {
            // Let already delivered connection reports land first.
            let _ = self.pump();
            self.forward(CycleEvent::Shutdown);
        }
        ServiceSummary {
            finished: self.finished,
            sent: self.sent,
            recent: self.recent.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityType;
    use crate::brightness::{BrightnessLevel, BrightnessMessage};
    use crate::channel::{ChannelEvent, ChannelNotifier, JsonLineChannel};
    use crate::events::RequestLineRecognizer;
    use crate::preferences::{DayPeriod, MemoryStore};
    use crate::time_source::ManualTimeSource;
    use chrono::{DateTime, Local, TimeZone, Utc};
    use serial_test::serial;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;

    /// Refuses the first `failures` connects, counted over every instance.
    struct FlakyChannel {
        failures: u32,
        attempts: Arc<AtomicU32>,
        connected: bool,
        sent: Arc<Mutex<Vec<BrightnessLevel>>>,
    }

    impl TransmissionChannel for FlakyChannel {
        fn connect(&mut self, notify: ChannelNotifier) -> Result<()> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) < self.failures {
                notify(ChannelEvent::Failed("out of range".to_string()));
            } else {
                self.connected = true;
                notify(ChannelEvent::Connected);
            }
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn send(&mut self, message: &BrightnessMessage) -> Result<()> {
            self.sent.lock().unwrap().push(message.level);
            Ok(())
        }

        fn disconnect(&mut self) {
            self.connected = false;
        }
    }

    /// 2024-06-21 12:00 UTC.
    fn midday_utc() -> DateTime<Local> {
        Utc.with_ymd_and_hms(2024, 6, 21, 12, 0, 0)
            .unwrap()
            .with_timezone(&Local)
    }

    fn service(config: &Config, clock: Arc<ManualTimeSource>) -> Service {
        let channels: ChannelFactory = Box::new(|| Box::new(JsonLineChannel::new(std::io::sink())));
        Service::new(config, Arc::new(MemoryStore::default()), clock, channels).unwrap()
    }

    fn walking(at: DateTime<Local>) -> HostEvent {
        HostEvent::Activity(DetectedActivity::new(ActivityType::Walking, 80, at))
    }

    #[test]
    #[serial]
    fn test_activity_with_fallback_location_decides() {
        crate::logger::Log::set_enabled(false);
        let config = Config {
            latitude: Some(51.5),
            longitude: Some(-0.12),
            timezone: Some("Europe/London".to_string()),
            ..Default::default()
        };
        let clock = Arc::new(ManualTimeSource::new(midday_utc()));
        let mut service = service(&config, Arc::clone(&clock));
        service
            .start(&mut RequestLineRecognizer::new(std::io::sink()))
            .unwrap();

        service.handle(walking(clock.now())).unwrap();
        let outcomes = service.shutdown().recent;
        crate::logger::Log::set_enabled(true);

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].sent, Some(BrightnessLevel::Highest));
        assert_eq!(outcomes[0].decision.unwrap().period, DayPeriod::Day);
    }

    #[test]
    #[serial]
    fn test_each_activity_starts_fresh_cycle() {
        crate::logger::Log::set_enabled(false);
        let clock = Arc::new(ManualTimeSource::new(midday_utc()));
        let mut service = service(&Config::default(), Arc::clone(&clock));

        service
            .handle(HostEvent::Location(
                LocationFix::new(0.0, 0.0, clock.now()).unwrap(),
            ))
            .unwrap();
        service.handle(walking(clock.now())).unwrap();
        service
            .handle(HostEvent::Activity(DetectedActivity::new(
                ActivityType::Still,
                60,
                clock.now(),
            )))
            .unwrap();
        let outcomes = service.shutdown().recent;
        crate::logger::Log::set_enabled(true);

        let sent: Vec<_> = outcomes.iter().filter_map(|o| o.sent).collect();
        assert_eq!(sent, vec![BrightnessLevel::Highest, BrightnessLevel::Medium]);
    }

    #[test]
    #[serial]
    fn test_ambient_mode_decides_on_screen_off() {
        crate::logger::Log::set_enabled(false);
        let config = Config {
            daynight_source: Some(DayNightSource::AmbientLight),
            ..Default::default()
        };
        let clock = Arc::new(ManualTimeSource::new(midday_utc()));
        let mut service = service(&config, Arc::clone(&clock));

        service.handle(walking(clock.now())).unwrap();

        service
            .handle(HostEvent::ScreenOn { display_on: true })
            .unwrap();
        for _ in 0..4 {
            clock.advance(Duration::from_secs(3));
            service
                .handle(HostEvent::Light(LightSample::new(20.0, clock.now())))
                .unwrap();
        }
        clock.advance(Duration::from_millis(500));
        service.handle(HostEvent::ScreenOff).unwrap();

        let outcomes = service.shutdown().recent;
        crate::logger::Log::set_enabled(true);

        let sent: Vec<_> = outcomes.iter().filter_map(|o| o.sent).collect();
        assert_eq!(sent, vec![BrightnessLevel::Lowest]);
    }

    #[test]
    #[serial]
    fn test_light_ignored_when_link_brightness_off() {
        crate::logger::Log::set_enabled(false);
        let config = Config {
            daynight_source: Some(DayNightSource::AmbientLight),
            link_brightness: Some(false),
            ..Default::default()
        };
        let clock = Arc::new(ManualTimeSource::new(midday_utc()));
        let mut service = service(&config, Arc::clone(&clock));

        service
            .handle(HostEvent::ScreenOn { display_on: true })
            .unwrap();
        service
            .handle(HostEvent::Light(LightSample::new(900.0, clock.now())))
            .unwrap();
        clock.advance(Duration::from_secs(20));
        service.handle(HostEvent::ScreenOff).unwrap();
        service.handle(walking(clock.now())).unwrap();

        let outcomes = service.shutdown().recent;
        crate::logger::Log::set_enabled(true);
        assert!(outcomes.iter().all(|o| o.sent.is_none()));
    }

    #[test]
    #[serial]
    fn test_run_consumes_reader_until_eof() {
        crate::logger::Log::set_enabled(false);
        let clock = Arc::new(ManualTimeSource::new(midday_utc()));
        let mut service = service(&Config::default(), Arc::clone(&clock));
        let input = concat!(
            "# fixture\n",
            "{\"event\":\"location\",\"latitude\":0.0,\"longitude\":0.0}\n",
            "garbage\n",
            "{\"event\":\"activity\",\"type\":\"driving\"}\n",
        );
        crate::events::spawn_reader(std::io::Cursor::new(input), service.sender()).unwrap();
        let running = AtomicBool::new(true);
        service.run(&running).unwrap();
        let outcomes = service.shutdown().recent;
        crate::logger::Log::set_enabled(true);

        assert_eq!(
            outcomes.iter().filter_map(|o| o.sent).collect::<Vec<_>>(),
            vec![BrightnessLevel::Highest]
        );
    }

    #[test]
    #[serial]
    fn test_events_handled_while_reconnect_is_pending() {
        crate::logger::Log::set_enabled(false);
        let config = Config {
            latitude: Some(51.5),
            longitude: Some(-0.12),
            timezone: Some("Europe/London".to_string()),
            connect_retries: Some(3),
            retry_backoff_ms: Some(10_000),
            ..Default::default()
        };
        let clock = Arc::new(ManualTimeSource::new(midday_utc()));
        let attempts = Arc::new(AtomicU32::new(0));
        let sent = Arc::new(Mutex::new(Vec::new()));
        let channels: ChannelFactory = {
            let attempts = Arc::clone(&attempts);
            let sent = Arc::clone(&sent);
            Box::new(move || {
                Box::new(FlakyChannel {
                    failures: 1,
                    attempts: Arc::clone(&attempts),
                    connected: false,
                    sent: Arc::clone(&sent),
                }) as Box<dyn TransmissionChannel>
            })
        };
        let mut service = Service::new(
            &config,
            Arc::new(MemoryStore::default()),
            Arc::clone(&clock) as Arc<dyn TimeSource>,
            channels,
        )
        .unwrap();

        service.handle(walking(clock.now())).unwrap();
        assert!(service.pump().unwrap());
        assert!(service.retry_pending());
        assert_eq!(clock.now(), midday_utc(), "backoff must not block");

        // A newer detection replaces the held level while the retry waits.
        service
            .handle(HostEvent::Activity(DetectedActivity::new(
                ActivityType::Still,
                70,
                clock.now(),
            )))
            .unwrap();
        assert!(sent.lock().unwrap().is_empty());

        clock.advance(Duration::from_secs(10));
        service.pump().unwrap();
        service.pump().unwrap();
        assert!(!service.retry_pending());
        assert_eq!(*sent.lock().unwrap(), vec![BrightnessLevel::Medium]);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        let summary = service.shutdown();
        crate::logger::Log::set_enabled(true);
        assert_eq!(summary.finished, 1);
        assert_eq!(summary.sent, 1);
    }

    #[test]
    #[serial]
    fn test_summary_keeps_recent_outcomes_bounded() {
        crate::logger::Log::set_enabled(false);
        let clock = Arc::new(ManualTimeSource::new(midday_utc()));
        let mut service = service(&Config::default(), Arc::clone(&clock));
        service
            .handle(HostEvent::Location(
                LocationFix::new(0.0, 0.0, clock.now()).unwrap(),
            ))
            .unwrap();
        for _ in 0..RECENT_OUTCOMES + 8 {
            service.handle(walking(clock.now())).unwrap();
        }
        let summary = service.shutdown();
        crate::logger::Log::set_enabled(true);

        assert_eq!(summary.finished, (RECENT_OUTCOMES + 8) as u64);
        assert_eq!(summary.sent, (RECENT_OUTCOMES + 8) as u64);
        assert_eq!(summary.recent.len(), RECENT_OUTCOMES);
    }
}
