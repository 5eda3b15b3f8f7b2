//! Core types for APDU (Application Protocol Data Unit) exchanges with a
//! secure element
//!
//! This crate provides the foundational types used by the SEAC access control
//! engine to talk to a tamper-resistant secure element according to
//! ISO/IEC 7816-4:
//!
//! - Building APDU commands and parsing APDU responses
//! - Status word interpretation (`90 00` is the sole success signal)
//! - The [`SeConnector`] boundary trait through which logical channels are
//!   opened, used and closed
//!
//! The physical transport behind [`SeConnector`] (RIL, NFC controller, PC/SC,
//! ...) is deliberately out of scope; implementations are supplied by the
//! platform integration.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod connector;
pub mod error;
pub mod response;

pub use command::Command;
pub use connector::{ChannelId, SeConnector};
pub use error::{Error, ResultExt};
pub use response::{Response, StatusWord};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports() {
        let cmd = Command::new(0x00, 0xA4, 0x00, 0x04);
        assert_eq!(cmd.header(), [0x00, 0xA4, 0x00, 0x04]);

        let resp = Response::success(Some(Bytes::from_static(&[0x01, 0x02])));
        assert!(resp.is_success());
        assert_eq!(resp.status(), StatusWord::new(0x90, 0x00));
    }
}
