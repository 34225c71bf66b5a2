//! RFC 5322 header block parsing: folding, identifier tokens, encoded-words
//! (RFC 2047) and date parsing.
//!
//! Everything here is infallible. A malformed header block yields fewer (or
//! no) headers, never an error, so a broken message can only fail to match.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;

/// An unfolded header block, as returned by `FETCH BODY.PEEK[HEADER]`.
#[derive(Debug, Clone, Default)]
pub struct HeaderBlock {
    /// `(lowercase_name, raw_value)` pairs in original order.
    headers: Vec<(String, String)>,
}

impl HeaderBlock {
    /// Parse raw header bytes. The block ends at the first empty line.
    pub fn parse(raw: &[u8]) -> Self {
        let text = decode_header_bytes(raw);
        Self {
            headers: unfold_headers(&text),
        }
    }

    /// All values of a header (case-insensitive name), in order.
    pub fn values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .filter(move |(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First value of a header (case-insensitive name).
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values(name).next()
    }

    /// First value with RFC 2047 encoded-words decoded, or an empty string.
    pub fn decoded(&self, name: &str) -> String {
        self.first(name).map(decode_encoded_words).unwrap_or_default()
    }

    /// Number of headers in the block.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Whether the block contains no parsable header at all.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            // End of the header block
            if !result.is_empty() {
                break;
            }
            continue;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_ascii_lowercase();
            if name.is_empty() || name.contains(char::is_whitespace) {
                continue;
            }
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name, value));
        }
    }

    result
}

/// Split an identifier header value into individual ids.
///
/// `References: <a@x> <b@y>`, `<a@x><b@y>`, comma separated lists and bare
/// whitespace separated ids are all accepted. Tokens are returned as found
/// (brackets included when present).
pub fn id_tokens(value: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    for piece in value.split(|c: char| c.is_whitespace() || c == ',') {
        if piece.is_empty() {
            continue;
        }
        let mut rest = piece;
        // "<a><b>" glued together
        while let Some(end) = rest.find('>') {
            let (token, tail) = rest.split_at(end + 1);
            tokens.push(token);
            rest = tail;
        }
        if !rest.is_empty() {
            tokens.push(rest);
        }
    }
    tokens
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// Values without encoded-words are returned unchanged.
pub fn decode_encoded_words(input: &str) -> String {
    if !input.contains("=?") {
        return input.to_string();
    }

    // mail-parser decodes unstructured fields, so wrap the value as a Subject
    let fake_msg = format!("Subject: {input}\r\n\r\n");
    mail_parser::MessageParser::default()
        .parse(fake_msg.as_bytes())
        .and_then(|msg| msg.subject().map(str::to_string))
        .unwrap_or_else(|| input.to_string())
}

/// Parse a date given on the command line or found in a header.
///
/// Accepts RFC 2822, RFC 3339, plain `YYYY-MM-DD` and IMAP `DD-Mon-YYYY`,
/// then falls back to mail-parser's lenient parser.
pub fn parse_date(date_str: &str) -> Option<NaiveDate> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    for fmt in ["%Y-%m-%d", "%d-%b-%Y", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(date);
        }
    }

    if let Some(dt) = mail_parser_date(trimmed) {
        return Some(dt.date_naive());
    }

    warn!(date = trimmed, "Could not parse date");
    None
}

/// Attempt to parse a date using `mail-parser`'s built-in parser.
fn mail_parser_date(input: &str) -> Option<DateTime<Utc>> {
    let fake_msg = format!("Date: {input}\n\n");
    let parsed = mail_parser::MessageParser::default().parse(fake_msg.as_bytes())?;
    let dt = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&dt)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: &[u8] = b"Message-Id: <abc@example.com>\r\n\
From: Alice <alice@example.com>\r\n\
References: <r1@example.com>\r\n\
\x20<r2@example.com>\r\n\
\t<r3@example.com>\r\n\
Subject: hello\r\n\
\r\n\
Body-Looking: not a header\r\n";

    #[test]
    fn test_parse_unfolds_continuations() {
        let block = HeaderBlock::parse(BLOCK);
        assert_eq!(
            block.first("references"),
            Some("<r1@example.com> <r2@example.com> <r3@example.com>")
        );
        assert_eq!(block.len(), 4);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let block = HeaderBlock::parse(BLOCK);
        assert_eq!(block.first("Message-ID"), Some("<abc@example.com>"));
        assert_eq!(block.first("MESSAGE-ID"), Some("<abc@example.com>"));
    }

    #[test]
    fn test_stops_at_blank_line() {
        let block = HeaderBlock::parse(BLOCK);
        assert_eq!(block.first("body-looking"), None);
    }

    #[test]
    fn test_garbage_yields_empty_block() {
        let block = HeaderBlock::parse(b"\xff\xfe not a header at all\n\n");
        assert!(block.is_empty());
        assert_eq!(block.decoded("subject"), "");
    }

    #[test]
    fn test_latin1_fallback() {
        let block = HeaderBlock::parse(b"Subject: caf\xe9\r\n\r\n");
        assert_eq!(block.first("subject"), Some("café"));
    }

    #[test]
    fn test_id_tokens() {
        assert_eq!(
            id_tokens("<a@x.com> <b@y.com>\t<c@z.com>"),
            vec!["<a@x.com>", "<b@y.com>", "<c@z.com>"]
        );
        assert_eq!(id_tokens("<a@x.com><b@y.com>"), vec!["<a@x.com>", "<b@y.com>"]);
        assert_eq!(id_tokens("a@x.com, b@y.com"), vec!["a@x.com", "b@y.com"]);
        assert!(id_tokens("   ").is_empty());
    }

    #[test]
    fn test_decode_base64_encoded_word() {
        assert_eq!(decode_encoded_words("=?UTF-8?B?SG9sYSBtdW5kbw==?="), "Hola mundo");
    }

    #[test]
    fn test_decode_q_encoded_word() {
        assert_eq!(decode_encoded_words("=?ISO-8859-1?Q?caf=E9?="), "café");
    }

    #[test]
    fn test_decode_plain_passthrough() {
        assert_eq!(decode_encoded_words("Re: plain, subject"), "Re: plain, subject");
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 2, 13);
        assert_eq!(parse_date("Tue, 13 Feb 2024 21:21:26 +0000"), expected);
        assert_eq!(parse_date("2024-02-13T21:21:26Z"), expected);
        assert_eq!(parse_date("2024-02-13"), expected);
        assert_eq!(parse_date("13-Feb-2024"), expected);
        assert_eq!(parse_date(""), None);
    }
}
