//! IMAP `SEARCH` criteria strings used by the exact and deep strategies.

use chrono::{Days, NaiveDate};

/// Quote a string for use as an IMAP `astring` inside SEARCH criteria.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            // CR/LF cannot appear in a quoted string
            '\r' | '\n' => out.push(' '),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// `HEADER "name" "value"`, in the flat or the parenthesized form.
///
/// Some servers reject one of the two spellings, so both are tried.
pub fn header(name: &str, value: &str, parenthesized: bool) -> String {
    let inner = format!("HEADER {} {}", quote(name), quote(value));
    if parenthesized {
        format!("({inner})")
    } else {
        inner
    }
}

/// IMAP date format: `13-Feb-2024`.
pub fn imap_date(date: NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string()
}

/// Inclusive window of `days` on each side of a reference date.
///
/// A side that would fall outside the representable calendar is left open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub first: Option<NaiveDate>,
    pub last: Option<NaiveDate>,
}

impl DateWindow {
    pub fn around(reference: NaiveDate, days: u32) -> Self {
        let span = Days::new(u64::from(days));
        Self {
            first: reference.checked_sub_days(span),
            last: reference.checked_add_days(span),
        }
    }

    /// Whether neither side constrains the search.
    pub fn is_unbounded(&self) -> bool {
        self.first.is_none() && self.before().is_none()
    }

    /// Exclusive upper bound for `SENTBEFORE`.
    fn before(&self) -> Option<NaiveDate> {
        self.last.and_then(|d| d.checked_add_days(Days::new(1)))
    }

    /// `SENTSINCE first SENTBEFORE last+1` (SENTBEFORE is exclusive).
    /// An open side is omitted.
    pub fn criteria(&self) -> String {
        let since = self.first.map(|d| format!("SENTSINCE {}", imap_date(d)));
        let before = self.before().map(|d| format!("SENTBEFORE {}", imap_date(d)));
        since.into_iter().chain(before).collect::<Vec<_>>().join(" ")
    }
}

/// One rung of the candidate-generation ladder, most selective first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateFilter {
    DateAndDomain(DateWindow, String),
    DateOnly(DateWindow),
    DomainOnly(String),
    Unfiltered,
}

impl CandidateFilter {
    /// Criteria string for this rung.
    pub fn criteria(&self) -> String {
        match self {
            Self::DateAndDomain(window, domain) => {
                format!("{} FROM {}", window.criteria(), quote(domain))
            }
            Self::DateOnly(window) => window.criteria(),
            Self::DomainOnly(domain) => format!("FROM {}", quote(domain)),
            Self::Unfiltered => "ALL".to_string(),
        }
    }

    /// Whether this rung filters on the sender domain.
    pub fn has_domain(&self) -> bool {
        matches!(self, Self::DateAndDomain(..) | Self::DomainOnly(_))
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::DateAndDomain(..) => "date+domain",
            Self::DateOnly(_) => "date",
            Self::DomainOnly(_) => "domain",
            Self::Unfiltered => "unfiltered",
        }
    }
}

/// Build the degradation ladder from whatever hints are available.
///
/// With both hints: date+domain, date, domain, unfiltered. Rungs needing a
/// missing hint are left out, so with no hints only `Unfiltered` remains.
pub fn ladder(window: Option<DateWindow>, domain: Option<&str>) -> Vec<CandidateFilter> {
    let window = window.filter(|w| !w.is_unbounded());
    let mut rungs = Vec::with_capacity(4);
    if let (Some(w), Some(d)) = (window, domain) {
        rungs.push(CandidateFilter::DateAndDomain(w, d.to_string()));
    }
    if let Some(w) = window {
        rungs.push(CandidateFilter::DateOnly(w));
    }
    if let Some(d) = domain {
        rungs.push(CandidateFilter::DomainOnly(d.to_string()));
    }
    rungs.push(CandidateFilter::Unfiltered);
    rungs
}
