//! Device-to-device transmission channel.
//!
//! wearlux does not implement a transport. It talks to one through
//! [`TransmissionChannel`]: open a connection, send one message, close. The
//! connection outcome is asynchronous and arrives later as a
//! [`ChannelEvent`] on the decision cycle's event queue.

pub mod json;

pub use json::JsonLineChannel;

use anyhow::Result;

use crate::brightness::BrightnessMessage;

/// Outcome of a connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    Failed(String),
}

/// Sink used to report connection outcomes back to the decision cycle.
pub type ChannelNotifier = Box<dyn FnOnce(ChannelEvent) + Send>;

/// One-shot transmission channel to the paired device.
#[cfg_attr(test, mockall::automock)]
pub trait TransmissionChannel: Send {
    /// Start connecting. The outcome must eventually be passed to `notify`,
    /// either before this returns or later from another thread.
    fn connect(&mut self, notify: ChannelNotifier) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Fire-and-forget send. Only valid while connected.
    fn send(&mut self, message: &BrightnessMessage) -> Result<()>;

    /// Drop every held connection.
    fn disconnect(&mut self);

    /// Human-readable name for logs.
    fn name(&self) -> &'static str {
        "channel"
    }
}
