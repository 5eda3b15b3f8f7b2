//! GlobalPlatform Secure Element access control enforcement
//!
//! Implements the rule retrieval and decision logic of "GlobalPlatform
//! Device Technology - Secure Element Access Control" v1.1: device
//! applications, identified by the SHA-1 hash of their signing certificate,
//! are granted or denied access to applets on a secure element according to
//! rules stored on the element itself.
//!
//! Two rule sources exist. Embedded elements host the ARA-M applet, which
//! serves the rule set over GET DATA (see [`ara`]); UICCs publish PKCS#15
//! access rule files walked over SELECT / READ BINARY (see [`arf`]). Both
//! normalize into the same [`rules::Rule`] model, cached under an 8-byte
//! refresh tag, and resolved most-specific-first by [`decision`]. The
//! [`AccessControlEnforcer`] facade ties one connector, one rule source and
//! the decision together.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod ara;
pub mod arf;
pub mod consts;
pub mod decision;
pub mod enforcer;
pub mod error;
pub mod rules;
pub mod session;
pub mod tlv;

#[cfg(test)]
mod mock;

pub use ara::AraRetriever;
pub use arf::ArfRetriever;
pub use decision::decide;
pub use enforcer::{AccessControlEnforcer, SecureElementType};
pub use error::{Error, Result, ResultExt};
pub use rules::{ApduFilter, ApduRule, AppletMatcher, ApplicationMatcher, Rule};
pub use session::ChannelSession;

// Re-export the core types callers need to implement a connector.
pub use seac_apdu_core::{ChannelId, Command, Response, SeConnector, StatusWord};
