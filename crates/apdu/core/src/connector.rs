//! Connector boundary for secure element communication
//!
//! This module defines the [`SeConnector`] trait, the capability object
//! through which the access control engine reaches the hardware. An
//! implementation opens a logical channel to an applet or file system,
//! exchanges one command/response pair at a time and closes the channel
//! again. Everything below this trait (radio interface layer, NFC
//! controller, PC/SC, ...) is the platform's responsibility.

use core::fmt;

use crate::command::Command;
use crate::error::Error;
use crate::response::Response;

/// Identifier of an open logical channel on a secure element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u8);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel {}", self.0)
    }
}

/// Trait for secure element connectors
///
/// Implementors must provide methods for opening a logical channel to an
/// application, exchanging a single APDU on that channel and closing it.
/// All three operations either complete or fail; there is no partial
/// success. A failed exchange (including a transport timeout) is reported
/// as an [`Error`] and is indistinguishable, to callers, from any other
/// exchange failure.
pub trait SeConnector: fmt::Debug + Send {
    /// Open a logical channel to the application identified by `aid`
    fn open_channel(&mut self, aid: &[u8]) -> Result<ChannelId, Error>;

    /// Send one command on an open channel and return the raw response
    /// (payload plus status word, unchecked)
    fn exchange(&mut self, channel: ChannelId, command: &Command) -> Result<Response, Error>;

    /// Close a previously opened logical channel
    fn close_channel(&mut self, channel: ChannelId) -> Result<(), Error>;
}
