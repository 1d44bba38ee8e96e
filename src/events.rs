//! Newline-delimited JSON events from the host platform.
//!
//! The daemon does not talk to sensors itself. A platform bridge writes one
//! JSON object per line:
//!
//! ```text
//! {"event":"activity","type":"walking","confidence":80}
//! {"event":"activity","code":3}
//! {"event":"location","latitude":47.37,"longitude":8.54}
//! {"event":"screen_on","display_on":true}
//! {"event":"light","lux":312.5}
//! {"event":"screen_off"}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Deserialize;
use std::io::{BufRead, Write};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

use crate::activity::{ActivityType, DetectedActivity};
use crate::signal::{LightSample, LocationFix};

/// A host event translated into domain values.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Activity(DetectedActivity),
    Location(LocationFix),
    Light(LightSample),
    ScreenOn { display_on: bool },
    ScreenOff,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum RawEvent {
    Activity {
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<i32>,
        #[serde(default = "full_confidence")]
        confidence: u8,
    },
    Location {
        latitude: f64,
        longitude: f64,
    },
    Light {
        lux: f32,
    },
    ScreenOn {
        #[serde(default = "display_on_default")]
        display_on: bool,
    },
    ScreenOff,
}

fn full_confidence() -> u8 {
    100
}

fn display_on_default() -> bool {
    true
}

/// Parse one input line observed at `at`. Returns `Ok(None)` for blank and
/// comment lines.
pub fn parse_line(line: &str, at: DateTime<Local>) -> Result<Option<HostEvent>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let raw: RawEvent = serde_json::from_str(trimmed)
        .with_context(|| format!("Invalid event: {trimmed}"))?;

    let event = match raw {
        RawEvent::Activity {
            kind,
            code,
            confidence,
        } => {
            let activity = match (kind, code) {
                (Some(name), _) => name.parse::<ActivityType>().unwrap_or_else(|_| {
                    log_debug!("Unrecognized activity '{}', treating as unknown", name);
                    ActivityType::Unknown
                }),
                (None, Some(code)) => ActivityType::from_code(code),
                (None, None) => anyhow::bail!("Activity event needs a type or a code"),
            };
            HostEvent::Activity(DetectedActivity::new(activity, confidence, at))
        }
        RawEvent::Location {
            latitude,
            longitude,
        } => {
            let fix = LocationFix::new(latitude, longitude, at).with_context(|| {
                format!("Location out of range: {latitude}, {longitude}")
            })?;
            HostEvent::Location(fix)
        }
        RawEvent::Light { lux } => HostEvent::Light(LightSample::new(lux, at)),
        RawEvent::ScreenOn { display_on } => HostEvent::ScreenOn { display_on },
        RawEvent::ScreenOff => HostEvent::ScreenOff,
    };

    Ok(Some(event))
}

/// Message from the reader thread.
#[derive(Debug)]
pub enum ReaderMessage {
    Line(String),
    Eof,
    Error(String),
}

/// Read lines on a background thread so the consumer can stay responsive
/// to shutdown signals.
pub fn spawn_reader<R, T>(reader: R, sender: Sender<T>) -> Result<()>
where
    R: BufRead + Send + 'static,
    T: From<ReaderMessage> + Send + 'static,
{
    thread::Builder::new()
        .name("event-reader".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let message = match line {
                    Ok(line) => ReaderMessage::Line(line),
                    Err(e) => ReaderMessage::Error(e.to_string()),
                };
                if sender.send(message.into()).is_err() {
                    return;
                }
            }
            let _ = sender.send(ReaderMessage::Eof.into());
        })
        .context("Failed to spawn event reader thread")?;
    Ok(())
}

/// Schedules periodic activity classification on the host.
pub trait ActivityRecognizer {
    fn request_updates(&mut self, interval: Duration) -> Result<()>;
}

/// Asks the platform bridge for activity updates with a JSON line.
pub struct RequestLineRecognizer<W: Write> {
    writer: W,
}

impl<W: Write> RequestLineRecognizer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ActivityRecognizer for RequestLineRecognizer<W> {
    fn request_updates(&mut self, interval: Duration) -> Result<()> {
        let request = serde_json::json!({
            "path": "/activity/request",
            "data": { "interval_ms": interval.as_millis() as u64 },
        });
        writeln!(self.writer, "{request}").context("Failed to request activity updates")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Cursor;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 4, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_parse_activity_by_name_and_code() {
        let event = parse_line(
            r#"{"event":"activity","type":"in_vehicle","confidence":75}"#,
            at(),
        )
        .unwrap();
        assert_eq!(
            event,
            Some(HostEvent::Activity(DetectedActivity::new(
                ActivityType::InVehicle,
                75,
                at()
            )))
        );

        let Some(HostEvent::Activity(detected)) =
            parse_line(r#"{"event":"activity","code":5}"#, at()).unwrap()
        else {
            panic!("expected activity");
        };
        assert_eq!(detected.activity, ActivityType::Tilting);
        assert_eq!(detected.confidence, 100);
    }

    #[test]
    fn test_unrecognized_activity_is_unknown() {
        let Some(HostEvent::Activity(detected)) =
            parse_line(r#"{"event":"activity","type":"skydiving"}"#, at()).unwrap()
        else {
            panic!("expected activity");
        };
        assert_eq!(detected.activity, ActivityType::Unknown);

        let Some(HostEvent::Activity(detected)) =
            parse_line(r#"{"event":"activity","code":42}"#, at()).unwrap()
        else {
            panic!("expected activity");
        };
        assert_eq!(detected.activity, ActivityType::Unknown);
    }

    #[test]
    fn test_parse_other_events() {
        assert!(matches!(
            parse_line(r#"{"event":"location","latitude":47.37,"longitude":8.54}"#, at()),
            Ok(Some(HostEvent::Location(_)))
        ));
        assert_eq!(
            parse_line(r#"{"event":"light","lux":-3.0}"#, at()).unwrap(),
            Some(HostEvent::Light(LightSample::new(0.0, at())))
        );
        assert_eq!(
            parse_line(r#"{"event":"screen_on"}"#, at()).unwrap(),
            Some(HostEvent::ScreenOn { display_on: true })
        );
        assert_eq!(
            parse_line(r#"{"event":"screen_on","display_on":false}"#, at()).unwrap(),
            Some(HostEvent::ScreenOn { display_on: false })
        );
        assert_eq!(
            parse_line(r#"{"event":"screen_off"}"#, at()).unwrap(),
            Some(HostEvent::ScreenOff)
        );
    }

    #[test]
    fn test_skips_blank_and_comment_lines() {
        assert_eq!(parse_line("   ", at()).unwrap(), None);
        assert_eq!(parse_line("# morning commute", at()).unwrap(), None);
    }

    #[test]
    fn test_rejects_malformed_events() {
        assert!(parse_line("not json", at()).is_err());
        assert!(parse_line(r#"{"event":"activity"}"#, at()).is_err());
        assert!(parse_line(r#"{"event":"teleport"}"#, at()).is_err());
        assert!(parse_line(r#"{"event":"location","latitude":95.0,"longitude":0.0}"#, at()).is_err());
    }

    #[test]
    fn test_reader_delivers_lines_then_eof() {
        let (sender, receiver) = std::sync::mpsc::channel::<ReaderMessage>();
        spawn_reader(Cursor::new("one\ntwo\n"), sender).unwrap();
        let lines: Vec<String> = receiver
            .iter()
            .map_while(|message| match message {
                ReaderMessage::Line(line) => Some(line),
                _ => None,
            })
            .collect();
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn test_recognizer_writes_request_line() {
        let mut recognizer = RequestLineRecognizer::new(Vec::new());
        recognizer
            .request_updates(Duration::from_millis(600_000))
            .unwrap();
        let output = String::from_utf8(recognizer.into_inner()).unwrap();
        assert_eq!(
            output,
            "{\"data\":{\"interval_ms\":600000},\"path\":\"/activity/request\"}\n"
        );
    }
}
