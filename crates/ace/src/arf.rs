//! Rule retrieval from the PKCS#15 access rule files
//!
//! UICC-style elements publish their access rules as a directory of
//! elementary files instead of an ARA-M applet (GPD section 7, "Structure of
//! Access Rule Files"). Retrieval walks the directory once per request:
//!
//! ODF -> DODF -> ACMF (refresh tag) -> ACRF -> condition files
//!
//! Every step is a SELECT by DF followed by a READ BINARY, each of which may
//! fail the whole chain. The ACMF carries the refresh tag; when it matches
//! the cached one the walk stops there and the cached rules are reused.
//! Distinct condition files are read exactly once even when several ACRF
//! entries reference the same file.
//!
//! Unlike the ARA-M source, any failure resets the cache to the empty rule
//! set: future calls must re-derive the policy from nothing (fail closed).

use std::collections::HashMap;

use bytes::Bytes;
use seac_apdu_core::{Command, SeConnector};
use tracing::{debug, warn};

use crate::consts::{aid, apdu, tags, FILE_CONTAINER_TAGS, GPD_OID, ODF_PATH, REFRESH_TAG_LEN};
use crate::error::{Error, Result, ResultExt};
use crate::rules::{ApduRule, AppletMatcher, ApplicationMatcher, Rule};
use crate::session::ChannelSession;
use crate::tlv::{self, Tlv};

/// Cached access rules read from the PKCS#15 file system
#[derive(Debug, Default)]
pub struct ArfRetriever {
    refresh_tag: Option<Bytes>,
    rules: Vec<Rule>,
}

impl ArfRetriever {
    /// Create a retriever with an empty cache
    pub const fn new() -> Self {
        Self {
            refresh_tag: None,
            rules: Vec::new(),
        }
    }

    /// The currently cached rule list
    pub fn cached_rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Return the current rule list, walking the file system unless the
    /// ACMF refresh tag proves the cache is still valid
    pub fn retrieve<C: SeConnector>(&mut self, session: &mut ChannelSession<C>) -> &[Rule] {
        if let Err(error) = self.refresh(session) {
            warn!(%error, "access rule file retrieval failed, resetting to an empty rule set");
            self.refresh_tag = None;
            self.rules.clear();
        }
        &self.rules
    }

    fn refresh<C: SeConnector>(&mut self, session: &mut ChannelSession<C>) -> Result<()> {
        session.open(&aid::PKCS15)?;
        match self.read_rules(session) {
            Ok(Some((tag, rules))) => {
                session.close()?;
                debug!(
                    count = rules.len(),
                    refresh_tag = hex::encode(&tag),
                    "retrieved access rule files"
                );
                self.refresh_tag = Some(tag);
                self.rules = rules;
                Ok(())
            }
            Ok(None) => {
                debug!("refresh tag unchanged, reusing cached rules");
                session.close()?;
                Ok(())
            }
            Err(error) => {
                session.abort();
                Err(error)
            }
        }
    }

    fn read_rules<C: SeConnector>(
        &self,
        session: &mut ChannelSession<C>,
    ) -> Result<Option<(Bytes, Vec<Rule>)>> {
        let odf = select_and_read(session, &ODF_PATH)
            .context("reading ODF")?
            .ok_or(Error::MissingObject("ODF"))?;
        // The ODF names the DODF: A7 { 30 { 04 df } }.
        let dodf_df = tlv::descend(&odf, &[tags::EF_ODF, tags::SEQUENCE, tags::OCTET_STRING])
            .and_then(Tlv::bytes)
            .ok_or(Error::MissingObject("DODF path in ODF"))?
            .clone();

        let dodf = select_and_read(session, &dodf_df)
            .context("reading DODF")?
            .ok_or(Error::MissingObject("DODF"))?;
        let acmf_df = locate_acmf(&dodf)?;

        let acmf = select_and_read(session, &acmf_df)
            .context("reading ACMF")?
            .ok_or(Error::MissingObject("ACMF"))?;
        // ACMF: 30 { 04 refresh-tag, 30 { 04 acrf-df } }.
        let refresh = tlv::descend(&acmf, &[tags::SEQUENCE, tags::OCTET_STRING])
            .and_then(Tlv::bytes)
            .ok_or(Error::MissingObject("refresh tag in ACMF"))?;
        if refresh.len() != REFRESH_TAG_LEN {
            return Err(Error::InvalidFormat("refresh tag length"));
        }
        if self.refresh_tag.as_ref() == Some(refresh) {
            return Ok(None);
        }
        let refresh = refresh.clone();

        let acrf_df = tlv::descend(&acmf, &[tags::SEQUENCE, tags::SEQUENCE, tags::OCTET_STRING])
            .and_then(Tlv::bytes)
            .ok_or(Error::MissingObject("ACRF path in ACMF"))?
            .clone();
        let acrf = select_and_read(session, &acrf_df)
            .context("reading ACRF")?
            .ok_or(Error::MissingObject("ACRF"))?;

        let rules = parse_entries(session, &acrf)?;
        Ok(Some((refresh, rules)))
    }
}

/// SELECT the file named by `df` and READ BINARY its contents.
///
/// The FCP template returned by SELECT carries the file size; an empty file
/// is reported as `None` without attempting the read.
fn select_and_read<C: SeConnector>(
    session: &mut ChannelSession<C>,
    df: &[u8],
) -> Result<Option<Vec<Tlv>>> {
    let select = Command::from_header(apdu::SELECT_BY_DF).with_data(df.to_vec());
    let fcp_bytes = session.transceive(&select)?;
    let fcp_nodes = tlv::decode(&fcp_bytes, FILE_CONTAINER_TAGS)?;
    let fcp = tlv::find(&fcp_nodes, tags::FCP).ok_or(Error::MissingObject("FCP template"))?;

    let size = fcp
        .find(tags::FCP_FILE_SIZE)
        .and_then(Tlv::bytes)
        .ok_or(Error::MissingObject("file size in FCP"))?;
    if size.iter().all(|&byte| byte == 0) {
        return Ok(None);
    }

    let content = session.transceive(&Command::from_header(apdu::READ_BINARY))?;
    Ok(Some(tlv::decode(&content, FILE_CONTAINER_TAGS)?))
}

/// Find the one DODF entry carrying the GPD-registered OID and return the
/// ACMF path it references.
///
/// "There shall be only one ACMF file per Secure Element. If a Secure
/// Element contains several ACMF files, then the security shall be
/// considered compromised" (GPD 7.1.5) - so anything other than exactly one
/// match fails the retrieval.
fn locate_acmf(dodf: &[Tlv]) -> Result<Bytes> {
    let records: Vec<&Tlv> = tlv::find_all(dodf, tags::EXTERNAL_DO)
        .filter(|record| {
            record
                .path(&[tags::EXTERNAL_DO, tags::SEQUENCE, tags::OID])
                .and_then(Tlv::bytes)
                .is_some_and(|oid| oid.as_ref() == GPD_OID)
        })
        .collect();

    if records.len() != 1 {
        return Err(Error::AcmfCount(records.len()));
    }

    records[0]
        .path(&[
            tags::EXTERNAL_DO,
            tags::SEQUENCE,
            tags::SEQUENCE,
            tags::OCTET_STRING,
        ])
        .and_then(Tlv::bytes)
        .cloned()
        .ok_or(Error::MissingObject("ACMF path in DODF"))
}

/// Read every condition file referenced by the ACRF (each distinct file
/// once) and resolve the entries into rules
fn parse_entries<C: SeConnector>(
    session: &mut ChannelSession<C>,
    acrf: &[Tlv],
) -> Result<Vec<Rule>> {
    let entries: Vec<&Tlv> = tlv::find_all(acrf, tags::SEQUENCE).collect();
    if entries.is_empty() {
        return Err(Error::MissingObject("entries in ACRF"));
    }

    // The ACRF routinely references one condition file from several
    // entries; reading it is slow, so memoize by DF.
    let mut conditions: HashMap<Vec<u8>, Option<Vec<Tlv>>> = HashMap::new();
    for entry in &entries {
        let df = condition_df(entry)?;
        if !conditions.contains_key(&df) {
            let contents = select_and_read(session, &df)
                .context(format!("reading condition file {}", hex::encode(&df)))?;
            conditions.insert(df, contents);
        }
    }

    let mut rules = Vec::with_capacity(entries.len());
    for entry in &entries {
        let applet = applet_matcher(entry)?;
        let df = condition_df(entry)?;
        let application = match conditions.get(&df).and_then(Option::as_ref) {
            // Absent or empty condition file: no application is granted
            // access to this applet.
            None => ApplicationMatcher::Hashes(Vec::new()),
            Some(condition) => application_matcher(condition)?,
        };
        rules.push(Rule {
            applet,
            application,
            // The rule files carry no APDU filters; access is all or
            // nothing per pairing.
            apdu: ApduRule::Always,
            nfc: None,
        });
    }
    Ok(rules)
}

fn condition_df(entry: &Tlv) -> Result<Vec<u8>> {
    entry
        .path(&[tags::SEQUENCE, tags::OCTET_STRING])
        .and_then(Tlv::bytes)
        .map(|bytes| bytes.to_vec())
        .ok_or(Error::MissingObject("condition file path in ACRF entry"))
}

/// A0 means the entry covers one applet (its AID is nested), 82 means it
/// covers all applets (GPD C.1 - C.3)
fn applet_matcher(entry: &Tlv) -> Result<AppletMatcher> {
    if let Some(aid) = entry
        .path(&[tags::GPD_AID, tags::OCTET_STRING])
        .and_then(Tlv::bytes)
    {
        Ok(AppletMatcher::Aid(aid.clone()))
    } else if entry.find(tags::GPD_ALL).is_some() {
        Ok(AppletMatcher::All)
    } else {
        Err(Error::InvalidFormat("unknown applet definition in ACRF entry"))
    }
}

/// A condition file with hash entries grants those applications; one with
/// only empty sequences grants all applications
fn application_matcher(condition: &[Tlv]) -> Result<ApplicationMatcher> {
    let sequences: Vec<&Tlv> = tlv::find_all(condition, tags::SEQUENCE).collect();
    if sequences.is_empty() {
        return Err(Error::InvalidFormat(
            "unknown application definition in condition file",
        ));
    }

    let hashes: Vec<Bytes> = sequences
        .iter()
        .filter_map(|sequence| sequence.find(tags::OCTET_STRING).and_then(Tlv::bytes))
        .cloned()
        .collect();

    if hashes.is_empty() {
        Ok(ApplicationMatcher::All)
    } else {
        Ok(ApplicationMatcher::Hashes(hashes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnector;
    use hex_literal::hex;

    const DODF_DF: [u8; 2] = [0x44, 0x01];
    const ACMF_DF: [u8; 2] = [0x43, 0x00];
    const ACRF_DF: [u8; 2] = [0x43, 0x01];
    const COND1_DF: [u8; 2] = [0x43, 0x10];
    const COND2_DF: [u8; 2] = [0x43, 0x11];

    const AID_A: [u8; 5] = hex!("A000000151");
    const HASH_1: [u8; 20] = [0x11; 20];
    const HASH_2: [u8; 20] = [0x22; 20];

    fn seq(children: Vec<Tlv>) -> Tlv {
        Tlv::constructed(tags::SEQUENCE, children)
    }

    fn octets(bytes: &[u8]) -> Tlv {
        Tlv::primitive(tags::OCTET_STRING, bytes.to_vec())
    }

    fn with_status(mut bytes: Vec<u8>) -> Vec<u8> {
        bytes.extend_from_slice(&hex!("9000"));
        bytes
    }

    /// FCP template announcing the file size, as returned by SELECT.
    fn fcp_response(size: u16) -> Vec<u8> {
        with_status(
            tlv::encode(&[Tlv::constructed(
                tags::FCP,
                vec![Tlv::primitive(tags::FCP_FILE_SIZE, size.to_be_bytes().to_vec())],
            )])
            .to_vec(),
        )
    }

    fn file_response(nodes: &[Tlv]) -> Vec<u8> {
        with_status(tlv::encode(nodes).to_vec())
    }

    fn odf() -> Vec<Tlv> {
        vec![Tlv::constructed(
            tags::EF_ODF,
            vec![seq(vec![octets(&DODF_DF)])],
        )]
    }

    fn dodf_record(oid: &[u8], df: &[u8]) -> Tlv {
        Tlv::constructed(
            tags::EXTERNAL_DO,
            vec![Tlv::constructed(
                tags::EXTERNAL_DO,
                vec![seq(vec![
                    Tlv::primitive(tags::OID, oid.to_vec()),
                    seq(vec![octets(df)]),
                ])],
            )],
        )
    }

    fn dodf() -> Vec<Tlv> {
        vec![
            // Unrelated oidDO entry, ignored by the scan.
            dodf_record(&hex!("2B0601040102"), &hex!("4FFF")),
            dodf_record(&GPD_OID, &ACMF_DF),
        ]
    }

    fn acmf(tag_fill: u8) -> Vec<Tlv> {
        vec![seq(vec![octets(&[tag_fill; 8]), seq(vec![octets(&ACRF_DF)])])]
    }

    fn acrf() -> Vec<Tlv> {
        vec![
            // One applet, condition file 1.
            seq(vec![
                Tlv::constructed(tags::GPD_AID, vec![octets(&AID_A)]),
                seq(vec![octets(&COND1_DF)]),
            ]),
            // All applets, condition file 2.
            seq(vec![
                Tlv::primitive(tags::GPD_ALL, Vec::new()),
                seq(vec![octets(&COND2_DF)]),
            ]),
            // Second reference to condition file 1: must not be re-read.
            seq(vec![
                Tlv::constructed(tags::GPD_AID, vec![octets(&AID_A)]),
                seq(vec![octets(&COND1_DF)]),
            ]),
        ]
    }

    fn cond_hashes() -> Vec<Tlv> {
        vec![seq(vec![octets(&HASH_1)])]
    }

    fn cond_allow_all() -> Vec<Tlv> {
        vec![seq(Vec::new())]
    }

    /// Script one full successful walk onto `connector`.
    fn script_walk(connector: MockConnector, tag_fill: u8) -> MockConnector {
        connector
            .reply(fcp_response(0x10))
            .reply(file_response(&odf()))
            .reply(fcp_response(0x40))
            .reply(file_response(&dodf()))
            .reply(fcp_response(0x14))
            .reply(file_response(&acmf(tag_fill)))
            .reply(fcp_response(0x30))
            .reply(file_response(&acrf()))
            .reply(fcp_response(0x18))
            .reply(file_response(&cond_hashes()))
            .reply(fcp_response(0x02))
            .reply(file_response(&cond_allow_all()))
    }

    fn expected_rules() -> Vec<Rule> {
        vec![
            Rule {
                applet: AppletMatcher::Aid(Bytes::copy_from_slice(&AID_A)),
                application: ApplicationMatcher::Hashes(vec![Bytes::copy_from_slice(&HASH_1)]),
                apdu: ApduRule::Always,
                nfc: None,
            },
            Rule {
                applet: AppletMatcher::All,
                application: ApplicationMatcher::All,
                apdu: ApduRule::Always,
                nfc: None,
            },
            Rule {
                applet: AppletMatcher::Aid(Bytes::copy_from_slice(&AID_A)),
                application: ApplicationMatcher::Hashes(vec![Bytes::copy_from_slice(&HASH_1)]),
                apdu: ApduRule::Always,
                nfc: None,
            },
        ]
    }

    #[test]
    fn test_full_walk() {
        let connector = script_walk(MockConnector::new(), 0xA1);
        let mut session = ChannelSession::new(connector);
        let mut retriever = ArfRetriever::new();

        assert_eq!(retriever.retrieve(&mut session), expected_rules());
        assert_eq!(session.connector().opened_aids(), &[aid::PKCS15.to_vec()]);
        // Five files selected and read, the shared condition file only once.
        assert_eq!(session.connector().exchanges(), 12);
        assert_eq!(session.connector().closed_channels(), 1);
    }

    #[test]
    fn test_refresh_tag_short_circuits() {
        let connector = script_walk(MockConnector::new(), 0xA1);
        // Second walk stops after reading the ACMF.
        let connector = connector
            .reply(fcp_response(0x10))
            .reply(file_response(&odf()))
            .reply(fcp_response(0x40))
            .reply(file_response(&dodf()))
            .reply(fcp_response(0x14))
            .reply(file_response(&acmf(0xA1)));
        let mut session = ChannelSession::new(connector);
        let mut retriever = ArfRetriever::new();

        retriever.retrieve(&mut session);
        assert_eq!(retriever.retrieve(&mut session), expected_rules());
        assert_eq!(session.connector().exchanges(), 18);
        assert_eq!(session.connector().closed_channels(), 2);
    }

    #[test]
    fn test_multiple_acmf_entries_fail_closed() {
        let dodf_two = vec![dodf_record(&GPD_OID, &ACMF_DF), dodf_record(&GPD_OID, &ACMF_DF)];
        let connector = MockConnector::new()
            .reply(fcp_response(0x10))
            .reply(file_response(&odf()))
            .reply(fcp_response(0x40))
            .reply(file_response(&dodf_two));
        let mut session = ChannelSession::new(connector);
        let mut retriever = ArfRetriever::new();

        assert!(retriever.retrieve(&mut session).is_empty());
        assert_eq!(session.connector().closed_channels(), 1);
    }

    #[test]
    fn test_empty_condition_file_denies_all() {
        let acrf_single = vec![seq(vec![
            Tlv::constructed(tags::GPD_AID, vec![octets(&AID_A)]),
            seq(vec![octets(&COND1_DF)]),
        ])];
        let connector = MockConnector::new()
            .reply(fcp_response(0x10))
            .reply(file_response(&odf()))
            .reply(fcp_response(0x40))
            .reply(file_response(&dodf()))
            .reply(fcp_response(0x14))
            .reply(file_response(&acmf(0xA1)))
            .reply(fcp_response(0x30))
            .reply(file_response(&acrf_single))
            // Condition file exists but is empty: SELECT only, no read.
            .reply(fcp_response(0x0000));
        let mut session = ChannelSession::new(connector);
        let mut retriever = ArfRetriever::new();

        let rules = retriever.retrieve(&mut session).to_vec();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].application, ApplicationMatcher::Hashes(Vec::new()));
    }

    #[test]
    fn test_condition_file_with_multiple_hashes() {
        let acrf_single = vec![seq(vec![
            Tlv::constructed(tags::GPD_AID, vec![octets(&AID_A)]),
            seq(vec![octets(&COND1_DF)]),
        ])];
        // One condition file granting two device applications.
        let cond = vec![seq(vec![octets(&HASH_1)]), seq(vec![octets(&HASH_2)])];
        let connector = MockConnector::new()
            .reply(fcp_response(0x10))
            .reply(file_response(&odf()))
            .reply(fcp_response(0x40))
            .reply(file_response(&dodf()))
            .reply(fcp_response(0x14))
            .reply(file_response(&acmf(0xA1)))
            .reply(fcp_response(0x30))
            .reply(file_response(&acrf_single))
            .reply(fcp_response(0x30))
            .reply(file_response(&cond));
        let mut session = ChannelSession::new(connector);
        let mut retriever = ArfRetriever::new();

        let rules = retriever.retrieve(&mut session).to_vec();
        assert_eq!(rules.len(), 1);
        assert_eq!(
            rules[0].application,
            ApplicationMatcher::Hashes(vec![
                Bytes::copy_from_slice(&HASH_1),
                Bytes::copy_from_slice(&HASH_2),
            ])
        );
    }

    #[test]
    fn test_failure_resets_cache_to_empty() {
        let connector = script_walk(MockConnector::new(), 0xA1)
            .reply(fcp_response(0x10))
            .reply(file_response(&odf()))
            .reply(fcp_response(0x40))
            .reply(file_response(&dodf()))
            .reply(fcp_response(0x14))
            .reply(file_response(&acmf(0xB2)))
            // ACRF select fails.
            .reply(hex!("6A82").to_vec());
        let mut session = ChannelSession::new(connector);
        let mut retriever = ArfRetriever::new();

        assert_eq!(retriever.retrieve(&mut session).len(), 3);
        // Unlike the ARA-M source, the previous cache does not survive.
        assert!(retriever.retrieve(&mut session).is_empty());
        assert_eq!(session.connector().closed_channels(), 2);
    }

    #[test]
    fn test_open_failure_yields_empty() {
        let mut session = ChannelSession::new(MockConnector::new().fail_open());
        let mut retriever = ArfRetriever::new();
        assert!(retriever.retrieve(&mut session).is_empty());
    }
}
