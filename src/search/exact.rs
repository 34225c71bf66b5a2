//! Exact strategy: server-side `SEARCH HEADER` on every identifier header.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::criteria;
use crate::error::{Result, SearchError};
use crate::model::record::SeqNum;
use crate::model::target::TargetIdentifier;
use crate::session::MailboxSession;

/// Identifier headers, in search priority order.
///
/// `Message-Id` duplicates `Message-ID` on purpose: some servers match the
/// HEADER criterion name case-sensitively against their index.
pub const HEADER_SET: [&str; 4] = ["Message-ID", "Message-Id", "References", "In-Reply-To"];

/// Search the selected mailbox for `target` in every [`HEADER_SET`] header,
/// in both bracketed and bare form, and union the hits.
///
/// Rejected criteria are logged and skipped. Only connection-level errors
/// propagate.
pub fn search_exact(
    session: &mut dyn MailboxSession,
    target: &TargetIdentifier,
) -> Result<BTreeSet<SeqNum>> {
    let forms = [target.bracketed(), target.as_str().to_string()];
    let mut hits = BTreeSet::new();

    for name in HEADER_SET {
        for value in &forms {
            let found = search_header(session, name, value)?;
            if !found.is_empty() {
                debug!(header = name, value = %value, count = found.len(), "Exact hits");
            }
            hits.extend(found);
        }
    }
    Ok(hits)
}

/// One header/value pair, trying the flat then the parenthesized syntax.
fn search_header(
    session: &mut dyn MailboxSession,
    name: &str,
    value: &str,
) -> Result<BTreeSet<SeqNum>> {
    let mut last_reason = String::new();
    for parenthesized in [false, true] {
        match session.search(&criteria::header(name, value, parenthesized)) {
            Ok(found) => return Ok(found),
            Err(SearchError::CriteriaRejected(reason)) => last_reason = reason,
            Err(e) => return Err(e),
        }
    }
    warn!(header = name, reason = %last_reason, "Server rejected HEADER search");
    Ok(BTreeSet::new())
}
