//! Deep strategy: narrow by date window and sender domain, fetch headers of
//! the candidates, and verify identity locally.
//!
//! The candidate set is deliberately over-inclusive; verification is what
//! decides. Verification checks every token of every [`HEADER_SET`] field, so
//! a message that only mentions the target deep inside `References` matches.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::criteria::{self, CandidateFilter, DateWindow};
use super::exact::HEADER_SET;
use crate::error::{Result, SearchError};
use crate::model::record::SeqNum;
use crate::model::target::TargetIdentifier;
use crate::parser::header::{id_tokens, HeaderBlock};
use crate::session::MailboxSession;

/// Tunables for the deep strategy.
#[derive(Debug, Clone)]
pub struct DeepOptions {
    /// Days on each side of the reference date.
    pub window_days: u32,
    /// Upper bound on candidates whose headers are fetched.
    pub max_candidates: usize,
    /// Sequence numbers per FETCH command.
    pub fetch_batch_size: usize,
}

impl Default for DeepOptions {
    fn default() -> Self {
        Self {
            window_days: 1,
            max_candidates: 5000,
            fetch_batch_size: 200,
        }
    }
}

/// Narrowing hints for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeepHints {
    pub reference_date: Option<NaiveDate>,
    pub domain: Option<String>,
}

impl DeepHints {
    /// Derive hints from the id itself; an explicit date wins over the
    /// embedded timestamp.
    pub fn for_target(target: &TargetIdentifier, explicit_date: Option<NaiveDate>) -> Self {
        Self {
            reference_date: explicit_date.or_else(|| target.reference_date()),
            domain: target.domain_hint(),
        }
    }
}

/// Result of one deep search in one mailbox.
#[derive(Debug, Clone, Default)]
pub struct DeepOutcome {
    /// Verified messages with their raw header block.
    pub matches: BTreeMap<SeqNum, Vec<u8>>,
    /// Candidates produced by the accepted filter (before truncation).
    pub candidates: usize,
    /// Whether `max_candidates` cut the candidate set.
    pub truncated: bool,
    /// The ladder rung the server accepted, if any.
    pub filter: Option<CandidateFilter>,
}

/// Whether a header block names `target` in any identifier header.
///
/// Never fails: a malformed block simply does not match.
pub fn verify(block: &HeaderBlock, target: &TargetIdentifier) -> bool {
    HEADER_SET.iter().any(|name| {
        block
            .values(name)
            .flat_map(id_tokens)
            .any(|token| target.matches(token))
    })
}

/// Run the deep strategy against the selected mailbox.
pub fn search_deep(
    session: &mut dyn MailboxSession,
    target: &TargetIdentifier,
    hints: &DeepHints,
    options: &DeepOptions,
) -> Result<DeepOutcome> {
    let window = hints
        .reference_date
        .map(|d| DateWindow::around(d, options.window_days));
    let rungs = criteria::ladder(window, hints.domain.as_deref());

    let mut outcome = DeepOutcome::default();
    let Some((filter, candidates)) = generate_candidates(session, rungs)? else {
        warn!(target = %target, "Server rejected every candidate filter");
        return Ok(outcome);
    };

    outcome.candidates = candidates.len();
    let mut pool: Vec<SeqNum> = candidates.into_iter().collect();
    if pool.len() > options.max_candidates {
        warn!(
            target = %target,
            candidates = pool.len(),
            limit = options.max_candidates,
            "Too many candidates, verifying only the newest"
        );
        pool.drain(..pool.len() - options.max_candidates);
        outcome.truncated = true;
    }
    info!(
        target = %target,
        filter = filter.label(),
        candidates = outcome.candidates,
        checked = pool.len(),
        "Deep search candidates"
    );
    outcome.filter = Some(filter);

    for batch in pool.chunks(options.fetch_batch_size.max(1)) {
        let headers = match session.fetch_headers(batch) {
            Ok(h) => h,
            Err(e @ SearchError::Network(_)) => return Err(e),
            Err(e) => {
                warn!(error = %e, size = batch.len(), "Header fetch failed, skipping batch");
                continue;
            }
        };
        for (seq, raw) in headers {
            if verify(&HeaderBlock::parse(&raw), target) {
                debug!(seq, "Candidate verified");
                outcome.matches.insert(seq, raw);
            }
        }
    }

    Ok(outcome)
}

/// Walk the ladder until the server accepts a filter.
///
/// A rung constrained by the sender domain that finds nothing also widens
/// to the next rung: the id's domain often differs from the From domain.
fn generate_candidates(
    session: &mut dyn MailboxSession,
    rungs: Vec<CandidateFilter>,
) -> Result<Option<(CandidateFilter, BTreeSet<SeqNum>)>> {
    for rung in rungs {
        match session.search(&rung.criteria()) {
            Ok(found) if found.is_empty() && rung.has_domain() => {
                debug!(filter = rung.label(), "No candidates, widening");
            }
            Ok(found) => return Ok(Some((rung, found))),
            Err(SearchError::CriteriaRejected(reason)) => {
                warn!(filter = rung.label(), reason = %reason, "Candidate filter rejected, degrading");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}
