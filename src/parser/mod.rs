//! Header parsing: header block unfolding, identifier tokens, encoded-words,
//! and Message-ID normalization.

pub mod header;
pub mod message_id;
