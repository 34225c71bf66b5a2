//! The mailbox session capability consumed by the search core.
//!
//! The core never talks IMAP directly. It drives a [`MailboxSession`], which
//! the binary backs with a real connection ([`imap::ImapSession`]) and tests
//! back with a scripted fake. Every operation is read-only.

pub mod imap;

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::model::record::SeqNum;

/// One entry of the server's folder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderInfo {
    /// Full mailbox name as reported by `LIST`.
    pub name: String,
    /// `false` for `\Noselect` container nodes.
    pub selectable: bool,
}

impl FolderInfo {
    pub fn new(name: impl Into<String>, selectable: bool) -> Self {
        Self {
            name: name.into(),
            selectable,
        }
    }
}

/// Read-only access to one logged-in mailbox session.
///
/// Sequence numbers are scoped to the currently selected mailbox.
pub trait MailboxSession {
    /// List every folder with its selectability.
    fn list_folders(&mut self) -> Result<Vec<FolderInfo>>;

    /// Open a mailbox read-only. Fails with `MailboxSelection` when the
    /// mailbox does not exist or cannot be opened.
    fn select(&mut self, mailbox: &str) -> Result<()>;

    /// Run a `SEARCH` with the given criteria string against the selected
    /// mailbox. Servers refusing the criteria yield `CriteriaRejected`.
    fn search(&mut self, criteria: &str) -> Result<BTreeSet<SeqNum>>;

    /// Fetch the raw header block (no body) of each sequence number.
    /// Messages the server does not return are absent from the map.
    fn fetch_headers(&mut self, seqs: &[SeqNum]) -> Result<BTreeMap<SeqNum, Vec<u8>>>;

    /// Re-establish a dropped connection. The selected mailbox is lost.
    fn reconnect(&mut self) -> Result<()>;
}

/// Render sequence numbers as a compact IMAP sequence set (`1:3,7,9:10`).
pub fn sequence_set(seqs: &[SeqNum]) -> String {
    let mut sorted: Vec<SeqNum> = seqs.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts: Vec<String> = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(mut start) = iter.next() else {
        return String::new();
    };
    let mut end = start;
    for n in iter {
        if end.checked_add(1) == Some(n) {
            end = n;
            continue;
        }
        parts.push(range_part(start, end));
        start = n;
        end = n;
    }
    parts.push(range_part(start, end));
    parts.join(",")
}

fn range_part(start: SeqNum, end: SeqNum) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{start}:{end}")
    }
}
