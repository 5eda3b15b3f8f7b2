//! Access control enforcement facade
//!
//! The [`AccessControlEnforcer`] is the entry point callers use: it owns the
//! channel session to one secure element, the rule source appropriate for
//! that element, and answers the three access questions. Each query
//! retrieves the current rule set (served from cache when the refresh tag
//! permits) and resolves it with [`crate::decision::decide`].

use seac_apdu_core::SeConnector;
use tracing::debug;

use crate::ara::AraRetriever;
use crate::arf::ArfRetriever;
use crate::decision;
use crate::rules::Rule;
use crate::session::ChannelSession;

/// The kind of secure element behind a connector.
///
/// The kind selects the rule source: embedded elements host an ARA-M applet,
/// UICCs publish PKCS#15 access rule files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureElementType {
    /// Embedded secure element (eSE)
    Embedded,
    /// UICC / SIM
    Uicc,
}

impl SecureElementType {
    /// Whether this is an embedded element
    pub const fn is_embedded(&self) -> bool {
        matches!(self, Self::Embedded)
    }
}

#[derive(Debug)]
enum RuleSource {
    FileSystem(ArfRetriever),
    Applet(AraRetriever),
}

impl RuleSource {
    fn retrieve<'a, C: SeConnector>(&'a mut self, session: &mut ChannelSession<C>) -> &'a [Rule] {
        match self {
            Self::FileSystem(retriever) => retriever.retrieve(session),
            Self::Applet(retriever) => retriever.retrieve(session),
        }
    }
}

/// Access control enforcer for one secure element
#[derive(Debug)]
pub struct AccessControlEnforcer<C: SeConnector> {
    session: ChannelSession<C>,
    source: RuleSource,
    se_type: SecureElementType,
}

impl<C: SeConnector> AccessControlEnforcer<C> {
    /// Create an enforcer over `connector`, picking the rule source that
    /// matches the element kind
    pub fn new(connector: C, se_type: SecureElementType) -> Self {
        let source = match se_type {
            SecureElementType::Embedded => RuleSource::Applet(AraRetriever::new()),
            SecureElementType::Uicc => RuleSource::FileSystem(ArfRetriever::new()),
        };
        Self {
            session: ChannelSession::new(connector),
            source,
            se_type,
        }
    }

    /// May the device application identified by `cert_hash` open a channel
    /// to the applet identified by `aid`?
    pub fn is_access_allowed(&mut self, cert_hash: &[u8], aid: &[u8]) -> bool {
        self.query(cert_hash, aid, None)
    }

    /// May the device application send the command with this 4-byte header
    /// to the applet?
    pub fn is_apdu_access_allowed(&mut self, cert_hash: &[u8], aid: &[u8], header: [u8; 4]) -> bool {
        self.query(cert_hash, aid, Some(&header))
    }

    /// May HCI events originating from the applet be delivered to the device
    /// application? Evaluates the same pairing rule as channel access.
    pub fn is_hci_event_access_allowed(&mut self, cert_hash: &[u8], aid: &[u8]) -> bool {
        self.query(cert_hash, aid, None)
    }

    fn query(&mut self, cert_hash: &[u8], aid: &[u8], header: Option<&[u8; 4]>) -> bool {
        let rules = self.source.retrieve(&mut self.session);

        // An embedded element with no rules installed has no access control
        // policy: access is open. A UICC without rules denies, like any
        // other retrieval outcome with nothing matching.
        if rules.is_empty() && self.se_type.is_embedded() {
            debug!("no rules installed on embedded element, allowing");
            return true;
        }

        let allowed = decision::decide(rules, cert_hash, aid, header);
        debug!(
            cert_hash = hex::encode(cert_hash),
            aid = hex::encode(aid),
            header = header.map(hex::encode).unwrap_or_default(),
            allowed,
            "access decision"
        );
        allowed
    }
}
