//! Core error type for all APDU operations
//!
//! All error variants are consolidated here to simplify error handling and
//! facilitate bubbling up through the call stack.

use crate::response::StatusWord;

/// Core error type that encompasses all possible errors in the crate
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    //
    // Transport related errors
    //
    /// Failed to open a logical channel to the secure element
    #[error("Connection error: failed to open channel")]
    ConnectionError,

    /// Failed to transmit data
    #[error("Transmission error: failed to transmit data")]
    TransmissionError,

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    //
    // Response related errors
    //
    /// Parse error when processing a response
    #[error("Parse error: {0}")]
    ParseError(&'static str),

    /// The card answered with a non-success status word
    #[error("Card returned error status: {0}")]
    Status(StatusWord),

    //
    // General errors
    //
    /// Context error with message and source error
    #[error("{context}: {source}")]
    Context {
        /// Contextual message
        context: String,
        /// Source error
        source: Box<Self>,
    },

    /// Other error with a static message
    #[error("{0}")]
    Other(&'static str),
}

impl Error {
    /// Create a new error with context information
    pub fn with_context<S: Into<String>>(self, context: S) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a new error with a static message
    pub const fn other(message: &'static str) -> Self {
        Self::Other(message)
    }

    /// Create a new status error
    pub const fn status(sw1: u8, sw2: u8) -> Self {
        Self::Status(StatusWord::new(sw1, sw2))
    }

    /// Create a new parse error
    pub const fn parse(message: &'static str) -> Self {
        Self::ParseError(message)
    }
}

/// Extension trait for Result with APDU errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<S: Into<String>>(self, context: S) -> Result<T, Error>;
}

impl<T> ResultExt<T> for Result<T, Error> {
    fn context<S: Into<String>>(self, context: S) -> Self {
        self.map_err(|e| e.with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_chain() {
        let err: Result<(), Error> = Err(Error::status(0x6A, 0x82));
        let err = err.context("selecting ODF").unwrap_err();
        assert_eq!(
            err.to_string(),
            "selecting ODF: Card returned error status: 6A82 (File not found)"
        );
    }
}
