//! Core data model types: target identifiers and exported match records.

pub mod record;
pub mod target;
