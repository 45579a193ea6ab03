//! Free-text issue dates.
//!
//! Grammar, tokens split on whitespace:
//!   - a first token longer than one character marks a range ("1850 1860",
//!     "12 1999"); only the last token is parsed
//!   - otherwise the whole string is parsed ("5 May 1850")
//!
//! A single-token value such as "12-May-1999" is its own last token and
//! parses whole.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::error::{Error, Result};

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})$").unwrap());
static YEAR_MONTH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{1,2})$").unwrap());

const DAY_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%d-%B-%Y",
    "%d %B %Y",
    "%B %d, %Y",
    "%B %d %Y",
];

/// Parse an item's raw `date` field, applying the range rule.
pub fn parse_raw_date(raw: &str) -> Result<NaiveDateTime> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let candidate = match tokens.as_slice() {
        [] => return Err(Error::AmbiguousDateFormat(raw.to_string())),
        [first, .., last] if first.chars().count() > 1 => *last,
        [only] => *only,
        _ => raw.trim(),
    };
    parse_date(candidate).ok_or_else(|| Error::AmbiguousDateFormat(raw.to_string()))
}

fn parse_date(s: &str) -> Option<NaiveDateTime> {
    let date = if let Some(caps) = YEAR_RE.captures(s) {
        NaiveDate::from_ymd_opt(caps[1].parse().ok()?, 1, 1)
    } else if let Some(caps) = YEAR_MONTH_RE.captures(s) {
        NaiveDate::from_ymd_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, 1)
    } else {
        DAY_FORMATS
            .iter()
            .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
            // "May 1850"
            .or_else(|| NaiveDate::parse_from_str(&format!("1 {s}"), "%d %B %Y").ok())
    }?;
    date.and_hms_opt(0, 0, 0)
}
