//! Structured logging with box-drawing output.
//!
//! Every line written by wearlux goes through [`emit`], which applies the
//! visual prefix for the line kind, prepends a simulated-clock timestamp when
//! the time source is not real, and routes the result either to stdout or to
//! the file sink started with [`Log::start_file_logging`].
//!
//! ## Conventions
//!
//! - `log_block_start!` opens a new conceptual block (`┃` spacer, then `┣ msg`).
//! - `log_decorated!` continues a block (`┣ msg`).
//! - `log_indented!` lists details under the current line (`┃   msg`).
//! - `log_pipe!` inserts a bare `┃` spacer, typically before a semantic
//!   message that starts its own block.
//! - `log_info!`, `log_warning!`, `log_error!`, `log_debug!`, `log_critical!`
//!   carry a coloured `[LEVEL]` tag.
//! - `log_version!` prints the startup header and `log_end!` the terminator.
//!
//! Messages produced while decisions are being dispatched must never go to
//! stdout in daemon mode, because stdout carries the outgoing JSON messages.
//! The daemon therefore redirects the logger to stderr with
//! [`Log::set_target`].

use std::io::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{Sender, channel};

static LOGGING_ENABLED: AtomicBool = AtomicBool::new(true);
static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);
static TARGET: AtomicU8 = AtomicU8::new(Target::Stdout as u8);
static LOG_CHANNEL: OnceLock<Sender<LogMessage>> = OnceLock::new();

enum LogMessage {
    Formatted(String),
    Shutdown,
}

/// Where console output goes when no file sink is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Target {
    Stdout = 0,
    Stderr = 1,
}

/// Visual kind of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    Decorated,
    Indented,
    BlockStart,
    Pipe,
    Header,
    End,
    Info,
    Warning,
    Error,
    Debug,
    Critical,
}

impl Line {
    fn render(self, prefix: &str, message: &str) -> String {
        match self {
            Line::Decorated => format!("{prefix}┣ {message}\n"),
            Line::Indented => format!("{prefix}┃   {message}\n"),
            Line::BlockStart => format!("{prefix}┃\n{prefix}┣ {message}\n"),
            Line::Pipe => format!("{prefix}┃\n"),
            Line::Header => format!("{prefix}┏ {message} ━━╸\n"),
            Line::End => format!("{prefix}╹\n"),
            Line::Info => format!("{prefix}┣[\x1b[32mINFO\x1b[0m] {message}\n"),
            Line::Warning => format!("{prefix}┣[\x1b[33mWARNING\x1b[0m] {message}\n"),
            Line::Error => format!("{prefix}┣[\x1b[31mERROR\x1b[0m] {message}\n"),
            Line::Debug => format!("{prefix}┣[\x1b[36mDEBUG\x1b[0m] {message}\n"),
            Line::Critical => format!("{prefix}┣[\x1b[31mCRITICAL\x1b[0m] {message}\n"),
        }
    }
}

/// Runtime switches for the logger.
pub struct Log;

impl Log {
    /// Enable or disable all output.
    pub fn set_enabled(enabled: bool) {
        LOGGING_ENABLED.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled() -> bool {
        LOGGING_ENABLED.load(Ordering::SeqCst)
    }

    /// Enable `log_debug!` output.
    pub fn set_debug(enabled: bool) {
        DEBUG_ENABLED.store(enabled, Ordering::SeqCst);
    }

    pub fn is_debug() -> bool {
        DEBUG_ENABLED.load(Ordering::SeqCst)
    }

    /// Choose the console stream used when no file sink is installed.
    pub fn set_target(target: Target) {
        TARGET.store(target as u8, Ordering::SeqCst);
    }

    /// Route all output to `file_path` until the returned guard is dropped.
    ///
    /// The sink can only be installed once per process.
    pub fn start_file_logging(file_path: String) -> anyhow::Result<LoggerGuard> {
        let (tx, rx) = channel();

        LOG_CHANNEL
            .set(tx.clone())
            .map_err(|_| anyhow::anyhow!("Logger channel already initialized"))?;

        let handle = std::thread::spawn(move || {
            let mut file = std::fs::File::create(&file_path)?;
            loop {
                match rx.recv() {
                    Ok(LogMessage::Formatted(text)) => file.write_all(text.as_bytes())?,
                    Ok(LogMessage::Shutdown) | Err(_) => {
                        file.flush()?;
                        break;
                    }
                }
            }
            Ok::<(), anyhow::Error>(())
        });

        Ok(LoggerGuard {
            tx,
            handle: Some(handle),
        })
    }

    /// `[HH:MM:SS] ` when the clock is simulated, empty otherwise.
    pub fn timestamp_prefix() -> String {
        if crate::time_source::is_initialized() && crate::time_source::is_simulated() {
            format!("[{}] ", crate::time_source::now().format("%H:%M:%S"))
        } else {
            String::new()
        }
    }
}

/// Flushes and closes the file sink on drop.
pub struct LoggerGuard {
    tx: Sender<LogMessage>,
    handle: Option<std::thread::JoinHandle<anyhow::Result<()>>>,
}

impl Drop for LoggerGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(LogMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == 'm' {
                    break;
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Format and write one line. Called by the logging macros.
pub fn emit(line: Line, message: std::fmt::Arguments<'_>) {
    if !Log::is_enabled() || (line == Line::Debug && !Log::is_debug()) {
        return;
    }

    let text = line.render(&Log::timestamp_prefix(), &message.to_string());

    if let Some(tx) = LOG_CHANNEL.get() {
        let _ = tx.send(LogMessage::Formatted(strip_ansi_codes(&text)));
        return;
    }

    if TARGET.load(Ordering::SeqCst) == Target::Stderr as u8 {
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(text.as_bytes());
    } else {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

#[macro_export]
macro_rules! log_decorated {
    ($($arg:tt)*) => { $crate::logger::emit($crate::logger::Line::Decorated, format_args!($($arg)*)) };
}

#[macro_export]
macro_rules! log_indented {
    ($($arg:tt)*) => { $crate::logger::emit($crate::logger::Line::Indented, format_args!($($arg)*)) };
}

#[macro_export]
macro_rules! log_block_start {
    ($($arg:tt)*) => { $crate::logger::emit($crate::logger::Line::BlockStart, format_args!($($arg)*)) };
}

#[macro_export]
macro_rules! log_pipe {
    () => { $crate::logger::emit($crate::logger::Line::Pipe, format_args!("")) };
}

#[macro_export]
macro_rules! log_version {
    () => {
        $crate::logger::emit(
            $crate::logger::Line::Header,
            format_args!("wearlux v{}", env!("CARGO_PKG_VERSION")),
        )
    };
}

#[macro_export]
macro_rules! log_end {
    () => { $crate::logger::emit($crate::logger::Line::End, format_args!("")) };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { $crate::logger::emit($crate::logger::Line::Info, format_args!($($arg)*)) };
}

#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)*) => { $crate::logger::emit($crate::logger::Line::Warning, format_args!($($arg)*)) };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { $crate::logger::emit($crate::logger::Line::Error, format_args!($($arg)*)) };
}

/// Only printed after `Log::set_debug(true)`.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { $crate::logger::emit($crate::logger::Line::Debug, format_args!($($arg)*)) };
}

#[macro_export]
macro_rules! log_critical {
    ($($arg:tt)*) => { $crate::logger::emit($crate::logger::Line::Critical, format_args!($($arg)*)) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi_codes() {
        let colored = "┣[\x1b[33mWARNING\x1b[0m] sensor missing\n";
        assert_eq!(strip_ansi_codes(colored), "┣[WARNING] sensor missing\n");
        assert_eq!(strip_ansi_codes("plain"), "plain");
    }

    #[test]
    fn test_line_rendering() {
        assert_eq!(Line::Decorated.render("", "hello"), "┣ hello\n");
        assert_eq!(Line::Indented.render("", "detail"), "┃   detail\n");
        assert_eq!(Line::BlockStart.render("[12:00:00] ", "x"), "[12:00:00] ┃\n[12:00:00] ┣ x\n");
        assert_eq!(Line::End.render("", ""), "╹\n");
    }
}
