//! Target identifiers: the Message-IDs an operator is looking for.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use chrono::NaiveDate;

use crate::error::{Result, SearchError};
use crate::parser::message_id;

/// A normalized Message-ID to search for.
///
/// Stored without surrounding angle brackets. Case is preserved for display
/// and export; all comparisons go through [`TargetIdentifier::key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetIdentifier {
    id: String,
}

impl TargetIdentifier {
    /// Parse one identifier from user input. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let id = message_id::normalize(raw);
        if id.is_empty() {
            None
        } else {
            Some(Self { id: id.to_string() })
        }
    }

    /// The id without brackets, case preserved.
    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// The id wrapped in angle brackets.
    pub fn bracketed(&self) -> String {
        message_id::bracketed(&self.id)
    }

    /// Case-folded comparison key.
    pub fn key(&self) -> String {
        self.id.to_ascii_lowercase()
    }

    /// Whether a raw header token names this identifier.
    pub fn matches(&self, token: &str) -> bool {
        message_id::ids_equal(&self.id, token)
    }

    /// Date embedded in `YYYYMMDDHHMMSS.hash@domain` style ids.
    pub fn reference_date(&self) -> Option<NaiveDate> {
        message_id::reference_date(&self.id)
    }

    /// Domain after the `@`, if the id is address-shaped.
    pub fn domain_hint(&self) -> Option<String> {
        message_id::domain_hint(&self.id)
    }
}

impl fmt::Display for TargetIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Collect targets from inline arguments and an optional ids file.
///
/// The file holds one id per line; blank lines and `#` comments are skipped.
/// Duplicates (compared case-insensitively) keep their first occurrence.
pub fn load_targets(inline: &[String], ids_file: Option<&Path>) -> Result<Vec<TargetIdentifier>> {
    let mut raw: Vec<String> = inline.to_vec();

    if let Some(path) = ids_file {
        let contents = std::fs::read_to_string(path).map_err(|e| SearchError::io(path, e))?;
        raw.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string),
        );
    }

    let mut seen = HashSet::new();
    let targets: Vec<TargetIdentifier> = raw
        .iter()
        .filter_map(|r| TargetIdentifier::parse(r))
        .filter(|t| seen.insert(t.key()))
        .collect();

    if targets.is_empty() {
        return Err(SearchError::NoTargets);
    }
    Ok(targets)
}
