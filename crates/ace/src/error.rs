//! Error types for access control operations
//!
//! This module provides error types specific to access rule retrieval and
//! parsing. Transport and malformed-data failures are deliberately treated
//! alike by the retrieval strategies: both abort the retrieval chain after
//! closing any open channel.

use seac_apdu_core::StatusWord;
use thiserror::Error;

/// Result type for access control operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for access control operations
#[derive(Debug, Error)]
pub enum Error {
    /// Core error from seac_apdu_core
    #[error(transparent)]
    Core(#[from] seac_apdu_core::Error),

    /// A logical channel is already open for this secure element
    #[error("Logical channel already open")]
    ChannelInUse,

    /// No logical channel is open
    #[error("No logical channel open")]
    ChannelNotOpen,

    /// Malformed TLV data
    #[error("TLV error: {0}")]
    Tlv(&'static str),

    /// A required data object was missing from a decoded file
    #[error("Missing data object: {0}")]
    MissingObject(&'static str),

    /// Invalid or unsupported data format
    #[error("Invalid data format: {0}")]
    InvalidFormat(&'static str),

    /// The DODF referenced a number of Access Control Main Files other than
    /// one. Several ACMFs mean the element must be considered compromised,
    /// none means there is no usable rule source; both fail the retrieval.
    #[error("Found {0} access control main files, expected exactly 1")]
    AcmfCount(usize),

    /// Response indicates an error condition
    #[error("Card returned error status: {0}")]
    CardStatus(StatusWord),

    /// Context with source error
    #[error("{context}: {source}")]
    Context {
        /// Contextual message
        context: String,
        /// Source error
        source: Box<Self>,
    },
}

impl Error {
    /// Create a new error with context information
    pub fn with_context<S: Into<String>>(self, context: S) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for Result with context addition
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<S: Into<String>>(self, context: S) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context<S: Into<String>>(self, context: S) -> Self {
        self.map_err(|e| e.with_context(context))
    }
}
