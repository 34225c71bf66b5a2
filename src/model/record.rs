//! Exported match records.

use serde::Serialize;

use crate::parser::header::HeaderBlock;

/// Sequence number of a message inside the currently selected mailbox.
pub type SeqNum = u32;

/// The exportable header fields of a matched message.
///
/// Missing headers are empty strings; they never invalidate a match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeaderFields {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub date: String,
}

impl HeaderFields {
    /// Pick From/To/Subject (encoded-words decoded) and the raw Date.
    pub fn from_block(block: &HeaderBlock) -> Self {
        Self {
            from: block.decoded("from"),
            to: block.decoded("to"),
            subject: block.decoded("subject"),
            date: block.first("date").unwrap_or_default().to_string(),
        }
    }

    /// Parse a raw header block and pick the exportable fields.
    pub fn from_raw(raw: &[u8]) -> Self {
        Self::from_block(&HeaderBlock::parse(raw))
    }
}

/// One confirmed (or, with `include_missing`, one unmatched) target.
///
/// Column order in the CSV: message_id, mailbox, seqnum, from, to, subject, date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRecord {
    /// The target identifier as given by the operator (no brackets).
    pub message_id: String,
    /// Mailbox the message was found in; empty for a missing-target row.
    pub mailbox: String,
    /// Sequence number within `mailbox`; `None` for a missing-target row.
    pub seqnum: Option<SeqNum>,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub date: String,
}

impl MatchRecord {
    /// Build a record for a confirmed match.
    pub fn found(message_id: &str, mailbox: &str, seqnum: SeqNum, fields: &HeaderFields) -> Self {
        Self {
            message_id: message_id.to_string(),
            mailbox: mailbox.to_string(),
            seqnum: Some(seqnum),
            from: fields.from.clone(),
            to: fields.to.clone(),
            subject: fields.subject.clone(),
            date: fields.date.clone(),
        }
    }

    /// Build the placeholder row for a target with no match anywhere.
    pub fn missing(message_id: &str) -> Self {
        Self {
            message_id: message_id.to_string(),
            mailbox: String::new(),
            seqnum: None,
            from: String::new(),
            to: String::new(),
            subject: String::new(),
            date: String::new(),
        }
    }
}
