//! Field converters shared by detection and transformation

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

/// An accepted input date layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateFormat {
    pub name: &'static str,
    /// chrono pattern
    pub pattern: &'static str,
    separator: char,
    year_first: bool,
    year_digits: usize,
}

/// Accepted date layouts, tried in order
pub const DATE_FORMATS: [DateFormat; 6] = [
    DateFormat {
        name: "iso",
        pattern: "%Y-%m-%d",
        separator: '-',
        year_first: true,
        year_digits: 4,
    },
    DateFormat {
        name: "iso_slash",
        pattern: "%Y/%m/%d",
        separator: '/',
        year_first: true,
        year_digits: 4,
    },
    DateFormat {
        name: "us_slash",
        pattern: "%m/%d/%Y",
        separator: '/',
        year_first: false,
        year_digits: 4,
    },
    DateFormat {
        name: "us_slash_short",
        pattern: "%m/%d/%y",
        separator: '/',
        year_first: false,
        year_digits: 2,
    },
    DateFormat {
        name: "us_dash",
        pattern: "%m-%d-%Y",
        separator: '-',
        year_first: false,
        year_digits: 4,
    },
    DateFormat {
        name: "us_dash_short",
        pattern: "%m-%d-%y",
        separator: '-',
        year_first: false,
        year_digits: 2,
    },
];

impl DateFormat {
    /// Whether `s` has this layout's separator and year width.
    ///
    /// chrono's `%Y` happily reads "24" as year 24, so the year token width
    /// has to be checked before parsing.
    fn fits(&self, s: &str) -> bool {
        let parts: Vec<&str> = s.split(self.separator).collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return false;
        }
        let year = if self.year_first { parts[0] } else { parts[2] };
        year.len() == self.year_digits && year.chars().all(|c| c.is_ascii_digit())
    }

    pub fn parse(&self, s: &str) -> Option<NaiveDate> {
        if !self.fits(s) {
            return None;
        }
        NaiveDate::parse_from_str(s, self.pattern).ok()
    }
}

/// Parse a date in any of [`DATE_FORMATS`]; a trailing time is ignored
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let date_part = s.split([' ', 'T']).next().unwrap_or(s);
    if date_part.is_empty() {
        return None;
    }
    DATE_FORMATS.iter().find_map(|format| format.parse(date_part))
}

/// Parse a currency amount
///
/// Handles `$`, thousands separators, embedded spaces, a leading minus and
/// accounting parentheses: `(1,234.50)` is `-1234.50`.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let s = s.trim();
    let (negative, s) = match s.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, s),
    };
    let cleaned = s.replace([',', '$', ' '], "");
    if cleaned.is_empty() {
        return None;
    }
    let value = Decimal::from_str(&cleaned).ok()?;
    Some(if negative { -value } else { value })
}

/// Trim and collapse internal whitespace, keeping case
pub fn clean_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a header (or alias) for matching
///
/// Lowercases, turns punctuation and underscores into spaces and collapses
/// whitespace, so "Check_Date", "check date" and " CHECK-DATE " compare equal.
pub fn normalize_header(s: &str) -> String {
    let s = s.trim_start_matches('\u{feff}');
    let spaced: String = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    spaced.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}
