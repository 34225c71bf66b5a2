//! Message-ID canonicalization and the search hints derived from an id.
//!
//! Ids are compared with the surrounding angle brackets removed and without
//! regard to ASCII case. Ids of the shape `YYYYMMDDHHMMSS.hash@domain` carry
//! their creation time and the sender's domain, which the deep search uses to
//! narrow the candidate set.

use chrono::{NaiveDate, NaiveDateTime};

/// Strip surrounding angle brackets (and whitespace) from a Message-ID.
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)`. Malformed input is
/// returned trimmed and simply fails to match anything later.
pub fn normalize(raw: &str) -> &str {
    raw.trim_matches(|c: char| c == '<' || c == '>' || c.is_whitespace())
}

/// Wrap an id in angle brackets, as it is usually stored in headers.
pub fn bracketed(raw: &str) -> String {
    format!("<{}>", normalize(raw))
}

/// Compare two ids after normalization, ignoring ASCII case.
pub fn ids_equal(a: &str, b: &str) -> bool {
    let (a, b) = (normalize(a), normalize(b));
    !a.is_empty() && a.eq_ignore_ascii_case(b)
}

/// Extract the creation timestamp embedded in ids like
/// `20240213212126.4429A161827048B0@gmail.com`.
///
/// The id must start with exactly 14 digits followed by `.`, `-` or `@`.
/// Anything else (random tokens, impossible dates) yields `None`.
pub fn embedded_timestamp(id: &str) -> Option<NaiveDateTime> {
    let id = normalize(id);
    let digits = id.get(..14)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !matches!(id.as_bytes().get(14), Some(b'.' | b'-' | b'@')) {
        return None;
    }
    NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S").ok()
}

/// Reference date for the deep search window, if the id embeds one.
pub fn reference_date(id: &str) -> Option<NaiveDate> {
    embedded_timestamp(id).map(|ts| ts.date())
}

/// Sender domain hint: the lowercased part after the last `@`, when it
/// looks like a domain name.
pub fn domain_hint(id: &str) -> Option<String> {
    let id = normalize(id);
    let (local, domain) = id.rsplit_once('@')?;
    if local.is_empty() || domain.len() < 3 {
        return None;
    }
    let looks_like_domain = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    looks_like_domain.then(|| domain.to_ascii_lowercase())
}
