//! Channel writing messages as JSON lines to any writer.
//!
//! Used by the command line to hand decisions to an external transport
//! process over a pipe (stdout by default).

use anyhow::{Context, Result};
use std::io::Write;

use super::{ChannelEvent, ChannelNotifier, TransmissionChannel};
use crate::brightness::BrightnessMessage;

pub struct JsonLineChannel<W: Write + Send> {
    writer: W,
    connected: bool,
}

impl<W: Write + Send> JsonLineChannel<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            connected: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> TransmissionChannel for JsonLineChannel<W> {
    /// A writer is always reachable, so this connects immediately.
    fn connect(&mut self, notify: ChannelNotifier) -> Result<()> {
        self.connected = true;
        notify(ChannelEvent::Connected);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send(&mut self, message: &BrightnessMessage) -> Result<()> {
        if !self.connected {
            anyhow::bail!("Cannot send on a disconnected channel");
        }
        let line = serde_json::to_string(&message.to_json())?;
        writeln!(self.writer, "{line}").context("Failed to write brightness message")?;
        self.writer.flush().context("Failed to flush brightness message")?;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn name(&self) -> &'static str {
        "json-lines"
    }
}
