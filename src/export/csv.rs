//! Match aggregation and CSV export.
//!
//! Columns: message_id, mailbox, seqnum, from, to, subject, date.
//! Output is UTF-8, optionally with a BOM for Excel.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use crate::error::{Result, SearchError};
use crate::model::record::{HeaderFields, MatchRecord, SeqNum};
use crate::model::target::TargetIdentifier;

/// CSV header row.
pub const COLUMNS: [&str; 7] = [
    "message_id",
    "mailbox",
    "seqnum",
    "from",
    "to",
    "subject",
    "date",
];

/// Collects match records, at most one per (target, mailbox, seqnum).
#[derive(Debug, Default)]
pub struct MatchAggregator {
    seen: HashSet<(String, String, SeqNum)>,
    missing: HashSet<String>,
    records: Vec<MatchRecord>,
}

impl MatchAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a confirmed match. Returns `false` if this
    /// (target, mailbox, seqnum) triple was already recorded.
    pub fn add(
        &mut self,
        target: &TargetIdentifier,
        mailbox: &str,
        seqnum: SeqNum,
        fields: &HeaderFields,
    ) -> bool {
        self.insert(MatchRecord::found(target.as_str(), mailbox, seqnum, fields))
    }

    /// Record a placeholder row for a target that matched nowhere.
    pub fn add_missing(&mut self, target: &TargetIdentifier) -> bool {
        self.insert(MatchRecord::missing(target.as_str()))
    }

    /// Insert a prebuilt record under the same dedup rules as [`add`] and
    /// [`add_missing`].
    ///
    /// [`add`]: Self::add
    /// [`add_missing`]: Self::add_missing
    pub fn insert(&mut self, record: MatchRecord) -> bool {
        let key = record.message_id.to_ascii_lowercase();
        let fresh = match record.seqnum {
            Some(seqnum) => self.seen.insert((key, record.mailbox.clone(), seqnum)),
            None => self.missing.insert(key),
        };
        if fresh {
            self.records.push(record);
        }
        fresh
    }

    /// Records in insertion order.
    pub fn records(&self) -> &[MatchRecord] {
        &self.records
    }

    /// Number of confirmed matches (placeholder rows excluded).
    pub fn match_count(&self) -> usize {
        self.seen.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write the header row and one row per record.
    pub fn export<W: Write>(&self, sink: &mut W) -> std::io::Result<()> {
        writeln!(sink, "{}", COLUMNS.join(","))?;
        for record in &self.records {
            let seqnum = record.seqnum.map(|n| n.to_string()).unwrap_or_default();
            let row = [
                record.message_id.as_str(),
                record.mailbox.as_str(),
                seqnum.as_str(),
                record.from.as_str(),
                record.to.as_str(),
                record.subject.as_str(),
                record.date.as_str(),
            ]
            .map(csv_escape)
            .join(",");
            writeln!(sink, "{row}")?;
        }
        Ok(())
    }

    /// Export to a file, creating parent directories as needed.
    pub fn export_csv(&self, output_path: &Path, utf8_bom: bool) -> Result<()> {
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SearchError::io(parent, e))?;
        }
        let file =
            std::fs::File::create(output_path).map_err(|e| SearchError::io(output_path, e))?;
        self.write_file(std::io::BufWriter::new(file), utf8_bom)
            .map_err(|e| SearchError::io(output_path, e))
    }

    fn write_file<W: Write>(&self, mut out: W, utf8_bom: bool) -> std::io::Result<()> {
        if utf8_bom {
            out.write_all(&[0xEF, 0xBB, 0xBF])?;
        }
        self.export(&mut out)?;
        out.flush()
    }
}

/// Escape a value for CSV (RFC 4180).
///
/// Wraps in double quotes if the value contains commas, quotes, or newlines.
fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
