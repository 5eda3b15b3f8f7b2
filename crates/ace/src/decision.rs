//! Rule resolution
//!
//! Implements the conflict resolution algorithm of GPD SE Access Control
//! v1.1, sections 3.4.1 and 4.2.3: rules are consulted from most specific to
//! most generic and the first category that yields a match decides. The
//! ordering is mandated by GlobalPlatform and must not change.

use tracing::debug;

use crate::rules::Rule;

/// Decide whether the device application identified by `cert_hash` may talk
/// to the applet identified by `aid`.
///
/// With `header` set, the decision additionally applies the matched rule's
/// APDU filters to that 4-byte command header; without it, the question is
/// whether the pairing may exchange commands at all.
///
/// Resolution order, first match wins:
/// 1. Rule naming this exact (AID, hash) pairing: apply its APDU condition.
/// 2. Rule naming this AID with a specific hash list that excludes the
///    requester: deny unconditionally. The APDU condition is deliberately
///    not consulted; a more specific binding for the applet exists and it
///    excludes the requester.
/// 3. Rule naming this AID for all applications: apply its APDU condition.
/// 4. Rule naming this hash for all applets: apply its APDU condition.
/// 5. Rule covering all applets and all applications: apply its APDU
///    condition.
/// 6. No rule matched: deny.
///
/// An empty rule set falls through to step 6 here; the embedded-element
/// "no policy installed" special case lives in the facade, not in this
/// algorithm.
pub fn decide(rules: &[Rule], cert_hash: &[u8], aid: &[u8], header: Option<&[u8; 4]>) -> bool {
    // 1. Specific (AID, hash) rule.
    if let Some(rule) = rules
        .iter()
        .find(|rule| rule.applet.matches_aid(aid) && rule.application.contains(cert_hash))
    {
        debug!(?rule, "matched specific rule");
        return rule.apdu.allows(header);
    }

    // 2. Specific rule for this AID that excludes the requester. An empty
    // hash list (deny-all condition file) counts as specific.
    if let Some(rule) = rules
        .iter()
        .find(|rule| rule.applet.matches_aid(aid) && rule.application.is_specific())
    {
        debug!(?rule, "matched specific aid rule for another application, denying");
        return false;
    }

    // 3. This AID, all applications.
    if let Some(rule) = rules
        .iter()
        .find(|rule| rule.applet.matches_aid(aid) && rule.application.is_all())
    {
        debug!(?rule, "matched generic aid rule");
        return rule.apdu.allows(header);
    }

    // 4. This hash, all applets.
    if let Some(rule) = rules
        .iter()
        .find(|rule| rule.applet.is_all() && rule.application.contains(cert_hash))
    {
        debug!(?rule, "matched generic hash rule");
        return rule.apdu.allows(header);
    }

    // 5. All applets, all applications.
    if let Some(rule) = rules
        .iter()
        .find(|rule| rule.applet.is_all() && rule.application.is_all())
    {
        debug!(?rule, "matched generic rule");
        return rule.apdu.allows(header);
    }

    debug!("no matching rule, denying");
    false
}
