//! Search engine: mailbox resolution, the exact and deep strategies, and the
//! run driver that feeds matches into the aggregator.
//!
//! Each (target, mailbox) pair runs through a small state machine:
//! `NotStarted → ExactSearched → (Done | DeepSearching → Done)`.
//! Exact hits are confirmed against their fetched headers; a hit that only
//! matched as a substring counts as no hit.

pub mod criteria;
pub mod deep;
pub mod exact;
pub mod mailbox;

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use self::deep::{DeepHints, DeepOptions};
use crate::error::{Result, SearchError};
use crate::export::csv::MatchAggregator;
use crate::model::record::{HeaderFields, MatchRecord, SeqNum};
use crate::model::target::TargetIdentifier;
use crate::parser::header::HeaderBlock;
use crate::session::MailboxSession;

/// Run-wide search settings.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Fall back to the deep strategy when exact search finds nothing.
    pub deep: bool,
    pub deep_options: DeepOptions,
    /// Overrides the date embedded in target ids.
    pub reference_date: Option<NaiveDate>,
    /// Stop scanning mailboxes for a target after the first one with a match.
    pub first_match_only: bool,
    /// Export a placeholder row for targets found nowhere.
    pub include_missing: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            deep: true,
            deep_options: DeepOptions::default(),
            reference_date: None,
            first_match_only: false,
            include_missing: false,
        }
    }
}

/// Which strategy confirmed a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchSource {
    Exact,
    Deep,
}

/// Matches of one target in one mailbox.
#[derive(Debug, Clone, Default)]
pub struct MailboxMatches {
    pub source: Option<MatchSource>,
    pub messages: BTreeMap<SeqNum, HeaderFields>,
    /// The deep search hit `max_candidates`; results may be partial.
    pub truncated: bool,
}

/// State of a single target within a single selected mailbox.
#[derive(Debug, Clone)]
pub enum SearchState {
    NotStarted,
    ExactSearched(BTreeSet<SeqNum>),
    DeepSearching,
    Done(MailboxMatches),
}

/// Drives one target through the exact and deep strategies in the
/// currently selected mailbox.
pub struct TargetSearch<'a> {
    target: &'a TargetIdentifier,
    options: &'a SearchOptions,
    state: SearchState,
}

impl<'a> TargetSearch<'a> {
    pub fn new(target: &'a TargetIdentifier, options: &'a SearchOptions) -> Self {
        Self {
            target,
            options,
            state: SearchState::NotStarted,
        }
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, SearchState::Done(_))
    }

    /// Perform exactly one transition.
    pub fn step(&mut self, session: &mut dyn MailboxSession) -> Result<()> {
        let state = std::mem::replace(&mut self.state, SearchState::NotStarted);
        self.state = match state {
            SearchState::NotStarted => {
                SearchState::ExactSearched(exact::search_exact(session, self.target)?)
            }
            SearchState::ExactSearched(hits) if !hits.is_empty() => {
                let seqs: Vec<SeqNum> = hits.into_iter().collect();
                let confirmed = confirm_exact(session, self.target, &seqs)?;
                if confirmed.is_empty() {
                    SearchState::ExactSearched(BTreeSet::new())
                } else {
                    SearchState::Done(MailboxMatches {
                        source: Some(MatchSource::Exact),
                        messages: confirmed,
                        truncated: false,
                    })
                }
            }
            SearchState::ExactSearched(_) if self.options.deep => SearchState::DeepSearching,
            SearchState::ExactSearched(_) => SearchState::Done(MailboxMatches::default()),
            SearchState::DeepSearching => {
                let hints = DeepHints::for_target(self.target, self.options.reference_date);
                let outcome =
                    deep::search_deep(session, self.target, &hints, &self.options.deep_options)?;
                let source = (!outcome.matches.is_empty()).then_some(MatchSource::Deep);
                SearchState::Done(MailboxMatches {
                    source,
                    messages: outcome
                        .matches
                        .iter()
                        .map(|(seq, raw)| (*seq, HeaderFields::from_raw(raw)))
                        .collect(),
                    truncated: outcome.truncated,
                })
            }
            done @ SearchState::Done(_) => done,
        };
        Ok(())
    }

    /// Step until done and return the matches.
    pub fn run(mut self, session: &mut dyn MailboxSession) -> Result<MailboxMatches> {
        while !self.is_done() {
            self.step(session)?;
        }
        match self.state {
            SearchState::Done(matches) => Ok(matches),
            _ => unreachable!("loop exits only in Done"),
        }
    }
}

/// Fetch the headers of exact hits and drop the ones that do not actually
/// name `target` (`SEARCH HEADER` matches substrings).
///
/// Hits whose headers could not be fetched are kept with empty fields: the
/// server's answer is the only evidence left. A network error propagates.
fn confirm_exact(
    session: &mut dyn MailboxSession,
    target: &TargetIdentifier,
    seqs: &[SeqNum],
) -> Result<BTreeMap<SeqNum, HeaderFields>> {
    let raw = match session.fetch_headers(seqs) {
        Ok(raw) => raw,
        Err(e @ SearchError::Network(_)) => return Err(e),
        Err(e) => {
            warn!(error = %e, "Could not fetch headers of exact hits");
            BTreeMap::new()
        }
    };

    let mut confirmed = BTreeMap::new();
    for seq in seqs {
        match raw.get(seq) {
            Some(r) => {
                let block = HeaderBlock::parse(r);
                if deep::verify(&block, target) {
                    confirmed.insert(*seq, HeaderFields::from_block(&block));
                } else {
                    debug!(seq, target = %target, "Exact hit is only a substring match, dropped");
                }
            }
            None => {
                confirmed.insert(*seq, HeaderFields::default());
            }
        }
    }
    Ok(confirmed)
}

/// Progress notifications emitted by [`Searcher::run`].
#[derive(Debug)]
pub enum Progress<'a> {
    /// About to search `mailbox` (1-based `position` of `total`).
    Scanning {
        target: &'a TargetIdentifier,
        mailbox: &'a str,
        position: usize,
        total: usize,
    },
    /// A new record was aggregated.
    Matched {
        record: &'a MatchRecord,
        source: MatchSource,
    },
    /// A scoped failure that did not stop the run.
    Warning { message: &'a str },
}

/// Counters for the end-of-run report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub targets: usize,
    pub targets_found: usize,
    pub mailboxes: usize,
    pub exact_matches: usize,
    pub deep_matches: usize,
    pub warnings: Vec<String>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn matches(&self) -> usize {
        self.exact_matches + self.deep_matches
    }
}

/// Runs every target against every mailbox over one session.
pub struct Searcher<'s> {
    session: &'s mut dyn MailboxSession,
    options: SearchOptions,
    summary: RunSummary,
}

impl<'s> Searcher<'s> {
    pub fn new(session: &'s mut dyn MailboxSession, options: SearchOptions) -> Self {
        Self {
            session,
            options,
            summary: RunSummary::default(),
        }
    }

    /// Counters collected so far (also valid after a failed run).
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn into_summary(self) -> RunSummary {
        self.summary
    }

    /// Search every target in every mailbox, adding matches to `aggregator`.
    ///
    /// The `progress` callback returns `false` to cancel; the run then stops
    /// before the next mailbox with `SearchError::Cancelled`. On any error the
    /// aggregator keeps everything found so far.
    pub fn run(
        &mut self,
        targets: &[TargetIdentifier],
        mailboxes: &[String],
        aggregator: &mut MatchAggregator,
        progress: Option<&dyn Fn(&Progress) -> bool>,
    ) -> Result<()> {
        let notify = progress.unwrap_or(&|_| true);
        self.summary.targets = targets.len();
        self.summary.mailboxes = mailboxes.len();

        for target in targets {
            info!(target = %target, "Searching Message-ID");
            let mut found = false;

            for (i, mailbox) in mailboxes.iter().enumerate() {
                let scanning = Progress::Scanning {
                    target,
                    mailbox,
                    position: i + 1,
                    total: mailboxes.len(),
                };
                if !notify(&scanning) {
                    self.summary.cancelled = true;
                    return Err(SearchError::Cancelled);
                }

                let matches = match self.search_mailbox(target, mailbox) {
                    Ok(m) => m,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        self.warn(&e.to_string(), notify);
                        continue;
                    }
                };

                if matches.truncated {
                    let message = format!(
                        "{mailbox}: candidate limit reached for {target}, results may be partial"
                    );
                    self.warn(&message, notify);
                }

                let Some(source) = matches.source else {
                    continue;
                };
                for (seq, fields) in &matches.messages {
                    if aggregator.add(target, mailbox, *seq, fields) {
                        match source {
                            MatchSource::Exact => self.summary.exact_matches += 1,
                            MatchSource::Deep => self.summary.deep_matches += 1,
                        }
                        if let Some(record) = aggregator.records().last() {
                            notify(&Progress::Matched { record, source });
                        }
                    }
                }
                found = found || !matches.messages.is_empty();

                if found && self.options.first_match_only {
                    break;
                }
            }

            if found {
                self.summary.targets_found += 1;
            } else {
                info!(target = %target, "Not found in any mailbox");
                if self.options.include_missing {
                    aggregator.add_missing(target);
                }
            }
        }
        Ok(())
    }

    /// Select and search one mailbox, reconnecting once on connection loss.
    ///
    /// Only a failed reconnect is fatal. Losing the fresh connection again
    /// inside the same mailbox gives up on that mailbox alone.
    fn search_mailbox(
        &mut self,
        target: &TargetIdentifier,
        mailbox: &str,
    ) -> Result<MailboxMatches> {
        match self.try_mailbox(target, mailbox) {
            Err(SearchError::Network(reason)) => {
                warn!(mailbox, reason = %reason, "Connection lost, reconnecting once");
                self.session.reconnect()?;
                self.try_mailbox(target, mailbox).map_err(|e| match e {
                    SearchError::Network(reason) => SearchError::MailboxSelection {
                        mailbox: mailbox.to_string(),
                        reason: format!("connection lost again after reconnect: {reason}"),
                    },
                    other => other,
                })
            }
            other => other,
        }
    }

    fn try_mailbox(&mut self, target: &TargetIdentifier, mailbox: &str) -> Result<MailboxMatches> {
        self.session.select(mailbox)?;
        TargetSearch::new(target, &self.options).run(&mut *self.session)
    }

    fn warn(&mut self, message: &str, notify: &dyn Fn(&Progress) -> bool) {
        warn!("{message}");
        notify(&Progress::Warning { message });
        self.summary.warnings.push(message.to_string());
    }
}
