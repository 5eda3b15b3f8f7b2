//! Access rule model and the ARA-M rule stream parser
//!
//! A [`Rule`] is the normalized decision unit shared by both rule sources:
//! which applet(s) it covers, which device application(s) it covers, and the
//! APDU/NFC access conditions. The file-system source builds rules out of the
//! ACRF and its condition files (see [`crate::arf`]); the applet source
//! parses them from the flat `REF-AR-DO` stream delivered by the ARA-M,
//! which is handled here.

use bytes::Bytes;
use tracing::trace;

use crate::consts::{tags, RULE_CONTAINER_TAGS};
use crate::error::{Error, Result};
use crate::tlv::{self, read_length, Tlv};

/// Which applet(s) on the secure element a rule applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppletMatcher {
    /// A single applet, identified by its AID
    Aid(Bytes),
    /// Every applet on the element
    All,
}

impl AppletMatcher {
    /// Whether this matcher names exactly `aid`
    pub fn matches_aid(&self, aid: &[u8]) -> bool {
        match self {
            Self::Aid(own) => own.as_ref() == aid,
            Self::All => false,
        }
    }

    /// Whether this is the "all applets" sentinel
    pub const fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

/// Which device application(s) a rule applies to
///
/// A hash list is a *specific* matcher even when empty: an empty condition
/// file excludes every application (deny-all), which is not the same thing
/// as the "all applications" sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationMatcher {
    /// The certificate hashes of the permitted device applications
    Hashes(Vec<Bytes>),
    /// Every device application
    All,
}

impl ApplicationMatcher {
    /// Whether this matcher is a hash list containing `hash`
    pub fn contains(&self, hash: &[u8]) -> bool {
        match self {
            Self::Hashes(hashes) => hashes.iter().any(|own| own.as_ref() == hash),
            Self::All => false,
        }
    }

    /// Whether this matcher is a specific hash list (of any length)
    pub const fn is_specific(&self) -> bool {
        matches!(self, Self::Hashes(_))
    }

    /// Whether this is the "all applications" sentinel
    pub const fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

/// One 8-byte APDU filter: a 4-byte header template plus a 4-byte mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApduFilter {
    /// Permitted header bits (CLA, INS, P1, P2)
    pub header: [u8; 4],
    /// Which header bits participate in the comparison
    pub mask: [u8; 4],
}

impl ApduFilter {
    /// Whether `header` satisfies this filter:
    /// `(header & mask) == filter_header` for all four byte positions
    pub fn matches(&self, header: &[u8; 4]) -> bool {
        (0..4).all(|i| header[i] & self.mask[i] == self.header[i])
    }
}

/// APDU access condition of a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApduRule {
    /// APDU access is never allowed
    Never,
    /// APDU access is always allowed
    Always,
    /// APDU access is allowed for headers matching at least one filter
    Filters(Vec<ApduFilter>),
}

impl ApduRule {
    /// Parse the value of an APDU-AR-DO: a single boolean byte, or a
    /// concatenation of 8-byte filters
    pub fn from_do_value(value: &[u8]) -> Result<Self> {
        match value.len() {
            0 => Ok(Self::Never),
            1 => Ok(if value[0] == 0 { Self::Never } else { Self::Always }),
            len if len % 8 == 0 => {
                let filters = value
                    .chunks_exact(8)
                    .map(|chunk| ApduFilter {
                        header: [chunk[0], chunk[1], chunk[2], chunk[3]],
                        mask: [chunk[4], chunk[5], chunk[6], chunk[7]],
                    })
                    .collect();
                Ok(Self::Filters(filters))
            }
            _ => Err(Error::InvalidFormat("APDU-AR-DO is neither boolean nor filter list")),
        }
    }

    /// Serialize back into an APDU-AR-DO value
    pub fn to_do_value(&self) -> Vec<u8> {
        match self {
            Self::Never => vec![0x00],
            Self::Always => vec![0x01],
            Self::Filters(filters) => {
                let mut out = Vec::with_capacity(filters.len() * 8);
                for filter in filters {
                    out.extend_from_slice(&filter.header);
                    out.extend_from_slice(&filter.mask);
                }
                out
            }
        }
    }

    /// Evaluate this condition against an optional command header.
    ///
    /// Without a header (the caller asked the channel-level question, not the
    /// per-command one) everything except the literal `Never` may proceed;
    /// the caller re-checks each actual command. With a header, a filter
    /// list allows if any filter matches.
    pub fn allows(&self, header: Option<&[u8; 4]>) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::Filters(filters) => match header {
                None => true,
                Some(header) => filters.iter().any(|filter| filter.matches(header)),
            },
        }
    }
}

/// One normalized access rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Applet(s) the rule covers
    pub applet: AppletMatcher,
    /// Device application(s) the rule covers
    pub application: ApplicationMatcher,
    /// APDU access condition
    pub apdu: ApduRule,
    /// NFC event delivery flag, stored but not evaluated here
    pub nfc: Option<bool>,
}

impl Rule {
    /// Encode this rule as a `REF-AR-DO` record
    pub fn to_ref_ar_do(&self) -> Bytes {
        let mut ref_do = Vec::new();
        if let AppletMatcher::Aid(aid) = &self.applet {
            ref_do.push(Tlv::primitive(tags::AID_REF_DO, aid.clone()));
        }
        match &self.application {
            ApplicationMatcher::Hashes(hashes) => {
                for hash in hashes {
                    ref_do.push(Tlv::primitive(tags::HASH_REF_DO, hash.clone()));
                }
            }
            ApplicationMatcher::All => {
                ref_do.push(Tlv::primitive(tags::HASH_REF_DO, Bytes::new()));
            }
        }

        let mut ar_do = vec![Tlv::primitive(tags::APDU_AR_DO, self.apdu.to_do_value())];
        if let Some(nfc) = self.nfc {
            ar_do.push(Tlv::primitive(tags::NFC_AR_DO, vec![u8::from(nfc)]));
        }

        tlv::encode(&[Tlv::constructed(
            tags::REF_AR_DO,
            vec![
                Tlv::constructed(tags::REF_DO, ref_do),
                Tlv::constructed(tags::AR_DO, ar_do),
            ],
        )])
    }
}

/// Parse a reassembled ARA-M byte stream into rules.
///
/// The stream is a flat sequence of `REF-AR-DO` (0xE2) records. Bytes in tag
/// position that are not a `REF-AR-DO` tag are skipped rather than treated
/// as fatal, to tolerate padding between records.
pub fn parse_ref_ar_stream(stream: &[u8]) -> Result<Vec<Rule>> {
    let mut rules = Vec::new();
    let mut pos = 0;

    while pos < stream.len() {
        if stream[pos] != tags::REF_AR_DO {
            pos += 1;
            continue;
        }

        let (length, length_bytes) = read_length(&stream[pos + 1..])?;
        let start = pos + 1 + length_bytes;
        let end = start
            .checked_add(length)
            .filter(|&end| end <= stream.len())
            .ok_or(Error::Tlv("REF-AR-DO exceeds stream"))?;

        let children = tlv::decode(&stream[start..end], RULE_CONTAINER_TAGS)?;
        rules.push(parse_ref_ar_do(&children)?);
        pos = end;
    }

    trace!(count = rules.len(), "parsed ARA-M rule stream");
    Ok(rules)
}

fn parse_ref_ar_do(children: &[Tlv]) -> Result<Rule> {
    let ref_do = tlv::find(children, tags::REF_DO);
    let ar_do = tlv::find(children, tags::AR_DO);

    let applet = match ref_do.and_then(|node| node.find(tags::AID_REF_DO)) {
        Some(node) => {
            let aid = node.bytes().ok_or(Error::Tlv("AID-REF-DO is constructed"))?;
            if aid.is_empty() {
                AppletMatcher::All
            } else {
                AppletMatcher::Aid(aid.clone())
            }
        }
        None => AppletMatcher::All,
    };

    // An absent or empty DeviceAppID-REF-DO covers all device applications.
    let application = match ref_do.and_then(|node| node.find(tags::HASH_REF_DO)) {
        Some(node) => {
            let hash = node.bytes().ok_or(Error::Tlv("DeviceAppID-REF-DO is constructed"))?;
            if hash.is_empty() {
                ApplicationMatcher::All
            } else {
                ApplicationMatcher::Hashes(vec![hash.clone()])
            }
        }
        None => ApplicationMatcher::All,
    };

    let apdu = match ar_do.and_then(|node| node.find(tags::APDU_AR_DO)) {
        Some(node) => {
            let value = node.bytes().ok_or(Error::Tlv("APDU-AR-DO is constructed"))?;
            ApduRule::from_do_value(value)?
        }
        None => ApduRule::Always,
    };

    let nfc = ar_do
        .and_then(|node| node.find(tags::NFC_AR_DO))
        .and_then(Tlv::bytes)
        .and_then(|value| value.first().map(|&byte| byte != 0));

    Ok(Rule {
        applet,
        application,
        apdu,
        nfc,
    })
}
