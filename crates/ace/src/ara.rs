//! Rule retrieval from the ARA-M applet
//!
//! The Access Rule Application Master hands out the complete rule set as one
//! `Response-ALL-REF-AR-DO` byte stream, paginated over GET DATA commands:
//! the first response carries the BER-encoded total length, and GET DATA
//! [next] is issued until that many stream bytes have been accumulated. A
//! refresh tag read before the bulk transfer short-circuits the whole
//! exchange when the cached rules are still current.
//!
//! On a failed retrieval this source keeps a previously cached policy if one
//! exists (a transient hardware hiccup should not discard a known-good rule
//! set) and only falls back to the empty rule set when there is nothing to
//! keep. Callers must treat an empty rule list as the absence of any access,
//! not as a failure to retry.

use bytes::{Bytes, BytesMut};
use seac_apdu_core::{Command, SeConnector};
use tracing::{debug, warn};

use crate::consts::{aid, apdu, ALL_REF_AR_DO, REFRESH_TAG_DO, REFRESH_TAG_LEN};
use crate::error::{Error, Result, ResultExt};
use crate::rules::{self, Rule};
use crate::session::ChannelSession;
use crate::tlv::read_length;

/// Cached access rules read from the ARA-M applet
#[derive(Debug, Default)]
pub struct AraRetriever {
    refresh_tag: Option<Bytes>,
    rules: Vec<Rule>,
}

impl AraRetriever {
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

    /// Return the current rule list, refreshing it from the element unless
    /// the refresh tag proves the cache is still valid
    pub fn retrieve<C: SeConnector>(&mut self, session: &mut ChannelSession<C>) -> &[Rule] {
        if let Err(error) = self.refresh(session) {
            warn!(%error, "ARA-M rule retrieval failed");
            if self.refresh_tag.is_none() {
                // No known-good policy to fall back to.
                self.rules.clear();
            }
        }
        &self.rules
    }

    fn refresh<C: SeConnector>(&mut self, session: &mut ChannelSession<C>) -> Result<()> {
        session.open(&aid::ARA_M)?;
        match self.read_rules(session) {
            Ok(Some((tag, rules))) => {
                session.close()?;
                debug!(
                    count = rules.len(),
                    refresh_tag = hex::encode(&tag),
                    "retrieved ARA-M rules"
                );
                self.refresh_tag = Some(tag);
                self.rules = rules;
                Ok(())
            }
            Ok(None) => {
                debug!("refresh tag unchanged, reusing cached ARA-M rules");
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
        let tag = read_refresh_tag(session).context("reading refresh tag")?;
        if self.refresh_tag.as_ref() == Some(&tag) {
            return Ok(None);
        }

        let stream = read_all_data(session).context("reading rule stream")?;
        let rules = rules::parse_ref_ar_stream(&stream)?;
        Ok(Some((tag, rules)))
    }
}

/// Issue GET DATA [refresh tag] and validate the `DF 20 08` response shape
fn read_refresh_tag<C: SeConnector>(session: &mut ChannelSession<C>) -> Result<Bytes> {
    let payload = session.transceive(&Command::from_header(apdu::GET_REFRESH_TAG).with_le(0x00))?;

    if payload.len() != REFRESH_TAG_DO.len() + 1 + REFRESH_TAG_LEN {
        return Err(Error::InvalidFormat("refresh tag response length"));
    }
    if payload[..2] != REFRESH_TAG_DO || payload[2] as usize != REFRESH_TAG_LEN {
        return Err(Error::InvalidFormat("refresh tag data object"));
    }

    Ok(payload.slice(3..3 + REFRESH_TAG_LEN))
}

/// Issue GET DATA [all] and as many GET DATA [next] as it takes to
/// accumulate the declared stream length
fn read_all_data<C: SeConnector>(session: &mut ChannelSession<C>) -> Result<Bytes> {
    let payload = session.transceive(&Command::from_header(apdu::GET_ALL_DATA).with_le(0x00))?;

    if payload.len() < 2 || payload[..2] != ALL_REF_AR_DO {
        return Err(Error::InvalidFormat("missing ALL-REF-AR-DO tag"));
    }
    let (total, length_bytes) = read_length(&payload[2..])?;

    let mut stream = BytesMut::from(&payload[2 + length_bytes..]);
    while stream.len() < total {
        debug!(
            received = stream.len(),
            expected = total,
            "rule stream incomplete, requesting next fragment"
        );
        let fragment =
            session.transceive(&Command::from_header(apdu::GET_NEXT_DATA).with_le(0x00))?;
        if fragment.is_empty() {
            return Err(Error::InvalidFormat("GET DATA [next] returned no data"));
        }
        stream.extend_from_slice(&fragment);
    }

    if stream.len() > total {
        return Err(Error::InvalidFormat("rule stream longer than declared"));
    }
    Ok(stream.freeze())
}
