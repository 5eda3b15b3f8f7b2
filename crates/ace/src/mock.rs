//! Scripted connector for tests
//!
//! Replies are queued up front and handed out one per exchange, in order.
//! Every command that was sent is recorded so tests can assert on the exact
//! wire traffic.

use std::collections::VecDeque;

use seac_apdu_core::{ChannelId, Command, Error, Response, SeConnector};

#[derive(Debug, Default)]
pub(crate) struct MockConnector {
    replies: VecDeque<Result<Vec<u8>, Error>>,
    sent: Vec<Vec<u8>>,
    opened_aids: Vec<Vec<u8>>,
    closed: usize,
    fail_open: bool,
    next_channel: u8,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a raw reply (payload plus status word trailer)
    pub(crate) fn reply(mut self, bytes: Vec<u8>) -> Self {
        self.replies.push_back(Ok(bytes));
        self
    }

    /// Queue a transport failure for one exchange
    pub(crate) fn reply_err(mut self, error: Error) -> Self {
        self.replies.push_back(Err(error));
        self
    }

    /// Make every open_channel call fail
    pub(crate) const fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Raw bytes of every command sent, in order
    pub(crate) fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// AIDs passed to open_channel, in order
    pub(crate) fn opened_aids(&self) -> &[Vec<u8>] {
        &self.opened_aids
    }

    /// Number of close_channel calls
    pub(crate) const fn closed_channels(&self) -> usize {
        self.closed
    }

    /// Number of exchanges performed
    pub(crate) fn exchanges(&self) -> usize {
        self.sent.len()
    }
}

impl SeConnector for MockConnector {
    fn open_channel(&mut self, aid: &[u8]) -> Result<ChannelId, Error> {
        if self.fail_open {
            return Err(Error::ConnectionError);
        }
        self.opened_aids.push(aid.to_vec());
        let channel = ChannelId(self.next_channel);
        self.next_channel = self.next_channel.wrapping_add(1);
        Ok(channel)
    }

    fn exchange(&mut self, _channel: ChannelId, command: &Command) -> Result<Response, Error> {
        self.sent.push(command.to_bytes().to_vec());
        match self.replies.pop_front() {
            Some(Ok(bytes)) => Response::from_bytes(&bytes),
            Some(Err(error)) => Err(error),
            None => Err(Error::other("mock reply script exhausted")),
        }
    }

    fn close_channel(&mut self, _channel: ChannelId) -> Result<(), Error> {
        self.closed += 1;
        Ok(())
    }
}
