//! `midsearch` — find messages in IMAP mailboxes by Message-ID.
//!
//! This crate provides the search core: Message-ID normalization, mailbox
//! resolution, the exact `SEARCH HEADER` strategy, the date/domain deep
//! search with local header verification, and CSV export of the matches.
//! The IMAP connection itself is consumed through [`session::MailboxSession`].

pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod parser;
pub mod search;
pub mod session;
