//! A scripted in-memory `MailboxSession` for driving the search core.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, NaiveDate};

use midsearch::error::{Result, SearchError};
use midsearch::model::record::SeqNum;
use midsearch::session::{FolderInfo, MailboxSession};

/// How the fake server answers `SEARCH HEADER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderIndex {
    /// Case-insensitive substring match (RFC 3501 behavior).
    Substring,
    /// Only the literal stored value matches (brackets included).
    Literal,
    /// Identifier headers are not indexed at all.
    None,
}

pub struct ScriptedSession {
    pub folders: Vec<FolderInfo>,
    /// Mailbox name → raw header blocks; sequence number = position + 1.
    pub mailboxes: BTreeMap<String, Vec<String>>,
    pub header_index: HeaderIndex,
    /// Criteria starting with any of these prefixes are rejected with BAD.
    pub rejected_prefixes: Vec<String>,
    /// Mailbox name → number of upcoming `select` calls that lose the connection.
    pub network_failures: BTreeMap<String, usize>,
    pub reconnect_succeeds: bool,
    pub reconnects: usize,
    /// Every SEARCH criteria string, in order.
    pub searches: Vec<String>,
    /// Every FETCH request, in order.
    pub fetches: Vec<Vec<SeqNum>>,
    selected: Option<String>,
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self {
            folders: Vec::new(),
            mailboxes: BTreeMap::new(),
            header_index: HeaderIndex::Substring,
            rejected_prefixes: Vec::new(),
            network_failures: BTreeMap::new(),
            reconnect_succeeds: true,
            reconnects: 0,
            searches: Vec::new(),
            fetches: Vec::new(),
            selected: None,
        }
    }
}

/// Build a header block.
pub fn message(headers: &[(&str, &str)]) -> String {
    let mut out = String::new();
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");
    out
}

impl ScriptedSession {
    pub fn with_mailbox(mut self, name: &str, messages: Vec<String>) -> Self {
        self.folders.push(FolderInfo::new(name, true));
        self.mailboxes.insert(name.to_string(), messages);
        self
    }

    pub fn rejecting(mut self, prefix: &str) -> Self {
        self.rejected_prefixes.push(prefix.to_string());
        self
    }

    pub fn with_container(mut self, name: &str) -> Self {
        self.folders.push(FolderInfo::new(name, false));
        self
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    fn messages(&self) -> Result<&Vec<String>> {
        let name = self
            .selected
            .as_ref()
            .ok_or_else(|| SearchError::Protocol("no mailbox selected".to_string()))?;
        Ok(&self.mailboxes[name])
    }
}

fn header_values<'a>(block: &'a str, name: &str) -> Vec<&'a str> {
    block
        .lines()
        .filter_map(|line| line.split_once(':'))
        .filter(|(k, _)| k.trim().eq_ignore_ascii_case(name))
        .map(|(_, v)| v.trim())
        .collect()
}

fn sent_date(block: &str) -> Option<NaiveDate> {
    let raw = header_values(block, "Date").first().copied()?;
    DateTime::parse_from_rfc2822(raw).ok().map(|d| d.date_naive())
}

/// Split criteria into atoms, keeping quoted strings whole.
fn atoms(criteria: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;
    for c in criteria.trim_matches(|c| c == '(' || c == ')').chars() {
        match c {
            _ if escaped => {
                current.push(c);
                escaped = false;
            }
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ' ' if !quoted => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn imap_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%d-%b-%Y").expect("valid IMAP date in criteria")
}

impl ScriptedSession {
    fn matches(&self, block: &str, atoms: &[String]) -> bool {
        let mut i = 0;
        while i < atoms.len() {
            match atoms[i].to_ascii_uppercase().as_str() {
                "ALL" => i += 1,
                "SENTSINCE" => {
                    let since = imap_date(&atoms[i + 1]);
                    if sent_date(block).map_or(true, |d| d < since) {
                        return false;
                    }
                    i += 2;
                }
                "SENTBEFORE" => {
                    let before = imap_date(&atoms[i + 1]);
                    if sent_date(block).map_or(true, |d| d >= before) {
                        return false;
                    }
                    i += 2;
                }
                "FROM" => {
                    let needle = atoms[i + 1].to_ascii_lowercase();
                    let from = header_values(block, "From").join(" ").to_ascii_lowercase();
                    if !from.contains(&needle) {
                        return false;
                    }
                    i += 2;
                }
                "HEADER" => {
                    let name = &atoms[i + 1];
                    let value = &atoms[i + 2];
                    let values = header_values(block, name);
                    let hit = match self.header_index {
                        HeaderIndex::None => false,
                        HeaderIndex::Literal => values.iter().any(|v| v == value),
                        HeaderIndex::Substring => values
                            .iter()
                            .any(|v| v.to_ascii_lowercase().contains(&value.to_ascii_lowercase())),
                    };
                    if !hit {
                        return false;
                    }
                    i += 3;
                }
                other => panic!("unexpected search key {other}"),
            }
        }
        true
    }
}

impl MailboxSession for ScriptedSession {
    fn list_folders(&mut self) -> Result<Vec<FolderInfo>> {
        Ok(self.folders.clone())
    }

    fn select(&mut self, mailbox: &str) -> Result<()> {
        if let Some(left) = self.network_failures.get_mut(mailbox).filter(|n| **n > 0) {
            *left -= 1;
            self.selected = None;
            return Err(SearchError::Network("connection reset".to_string()));
        }
        if !self.mailboxes.contains_key(mailbox) {
            self.selected = None;
            return Err(SearchError::MailboxSelection {
                mailbox: mailbox.to_string(),
                reason: "NO Mailbox doesn't exist".to_string(),
            });
        }
        self.selected = Some(mailbox.to_string());
        Ok(())
    }

    fn search(&mut self, criteria: &str) -> Result<BTreeSet<SeqNum>> {
        self.searches.push(criteria.to_string());
        if self
            .rejected_prefixes
            .iter()
            .any(|p| criteria.starts_with(p.as_str()))
        {
            return Err(SearchError::CriteriaRejected("BAD Invalid search".to_string()));
        }
        let atoms = atoms(criteria);
        let messages = self.messages()?;
        Ok(messages
            .iter()
            .enumerate()
            .filter(|(_, block)| self.matches(block, &atoms))
            .map(|(i, _)| (i + 1) as SeqNum)
            .collect())
    }

    fn fetch_headers(&mut self, seqs: &[SeqNum]) -> Result<BTreeMap<SeqNum, Vec<u8>>> {
        self.fetches.push(seqs.to_vec());
        let messages = self.messages()?;
        let wanted: HashSet<SeqNum> = seqs.iter().copied().collect();
        Ok(messages
            .iter()
            .enumerate()
            .map(|(i, block)| ((i + 1) as SeqNum, block))
            .filter(|(seq, _)| wanted.contains(seq))
            .map(|(seq, block)| (seq, block.as_bytes().to_vec()))
            .collect())
    }

    fn reconnect(&mut self) -> Result<()> {
        self.reconnects += 1;
        self.selected = None;
        if self.reconnect_succeeds {
            Ok(())
        } else {
            Err(SearchError::Network("connection refused".to_string()))
        }
    }
}
