//! Channel session management
//!
//! A [`ChannelSession`] wraps an [`SeConnector`] and owns the "at most one
//! logical channel open per secure element" invariant: a second `open` while
//! one is outstanding fails immediately instead of queueing. Each retrieval
//! runs one fully serialized open / exchange* / close session; the close
//! step also runs on every error path so the hardware channel never leaks.

use bytes::Bytes;
use seac_apdu_core::{ChannelId, Command, SeConnector};
use tracing::{trace, warn};

use crate::error::{Error, Result};

/// A serialized command/response session against one secure element
#[derive(Debug)]
pub struct ChannelSession<C: SeConnector> {
    connector: C,
    channel: Option<ChannelId>,
}

impl<C: SeConnector> ChannelSession<C> {
    /// Create a session over the given connector, with no channel open
    pub const fn new(connector: C) -> Self {
        Self {
            connector,
            channel: None,
        }
    }

    /// Whether a logical channel is currently open
    pub const fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    /// Open a logical channel to the application identified by `aid`.
    ///
    /// Fails with [`Error::ChannelInUse`] if a channel is already
    /// outstanding.
    pub fn open(&mut self, aid: &[u8]) -> Result<()> {
        if self.channel.is_some() {
            return Err(Error::ChannelInUse);
        }

        let channel = self.connector.open_channel(aid)?;
        trace!(aid = hex::encode(aid), %channel, "opened logical channel");
        self.channel = Some(channel);
        Ok(())
    }

    /// Send one command on the open channel and return the response payload.
    ///
    /// `90 00` is the sole success status; any other status word fails the
    /// exchange.
    pub fn transceive(&mut self, command: &Command) -> Result<Bytes> {
        let channel = self.channel.ok_or(Error::ChannelNotOpen)?;
        let response = self.connector.exchange(channel, command)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::CardStatus(status));
        }

        let payload = response.into_payload()?;
        trace!(
            header = hex::encode(command.header()),
            response_len = payload.len(),
            "exchange complete"
        );
        Ok(payload)
    }

    /// Close the open channel
    pub fn close(&mut self) -> Result<()> {
        let channel = self.channel.take().ok_or(Error::ChannelNotOpen)?;
        self.connector.close_channel(channel)?;
        trace!(%channel, "closed logical channel");
        Ok(())
    }

    /// Close the channel on an error path, keeping the original error.
    ///
    /// A close failure at this point is only logged: the retrieval is
    /// already being aborted and the first error is the one to report.
    pub fn abort(&mut self) {
        if let Some(channel) = self.channel.take() {
            if let Err(error) = self.connector.close_channel(channel) {
                warn!(%channel, %error, "failed to close channel while aborting");
            }
        }
    }

    /// Access the underlying connector
    pub const fn connector(&self) -> &C {
        &self.connector
    }
}
