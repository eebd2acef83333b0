//! Meeting-date extraction from file names and URLs.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::{Captures, Regex};

/// `2024-03-05`, `2024_03_05`, `2024.3.5`
static ISO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\D)(?P<y>(?:19|20)\d{2})[-_.](?P<m>\d{1,2})[-_.](?P<d>\d{1,2})(?:\D|$)")
        .expect("valid regex")
});

/// `20240305`
static COMPACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\D)(?P<y>(?:19|20)\d{2})(?P<m>\d{2})(?P<d>\d{2})(?:\D|$)")
        .expect("valid regex")
});

/// `03-05-2024`, `3_5_24`
static US_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\D)(?P<m>\d{1,2})[-_.](?P<d>\d{1,2})[-_.](?P<y>\d{4}|\d{2})(?:\D|$)")
        .expect("valid regex")
});

/// `March 5, 2024`, `Mar_05_2024`, `Sept. 12th 2023`
static MONTH_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:^|[^a-z])(?P<mon>jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?[\s_-]*(?P<d>\d{1,2})(?:st|nd|rd|th)?,?[\s_-]*(?P<y>\d{4})(?:\D|$)",
    )
    .expect("valid regex")
});

/// Determine a document's meeting date.
///
/// The file name is tried before the URL; the first valid calendar date
/// wins. Falls back to the day the crawler found the document.
pub fn meeting_date(file_name: &str, url: &str, discovered_at: DateTime<Utc>) -> NaiveDate {
    extract_date(file_name)
        .or_else(|| extract_date(url))
        .unwrap_or_else(|| discovered_at.date_naive())
}

/// Find the first recognisable date in `text`.
pub fn extract_date(text: &str) -> Option<NaiveDate> {
    let patterns: [(&Regex, fn(&Captures<'_>) -> Option<NaiveDate>); 4] = [
        (&*ISO_RE, numeric_date),
        (&*COMPACT_RE, numeric_date),
        (&*US_RE, numeric_date),
        (&*MONTH_NAME_RE, named_month_date),
    ];

    patterns
        .iter()
        .find_map(|(re, build)| first_valid(re, text, *build))
}

/// Try every match of `re`, including overlapping ones, until `build` accepts one.
///
/// The delimiter groups consume a character on each side, so the search
/// restarts one character after the previous match start.
fn first_valid(
    re: &Regex,
    text: &str,
    build: fn(&Captures<'_>) -> Option<NaiveDate>,
) -> Option<NaiveDate> {
    let mut pos = 0;
    while let Some(caps) = re.captures_at(text, pos) {
        if let Some(date) = build(&caps) {
            return Some(date);
        }
        let start = caps.get(0)?.start();
        pos = start + text[start..].chars().next()?.len_utf8();
    }
    None
}

fn numeric_date(caps: &Captures<'_>) -> Option<NaiveDate> {
    let year = expand_year(caps.name("y")?.as_str())?;
    let month = caps.name("m")?.as_str().parse().ok()?;
    let day = caps.name("d")?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn named_month_date(caps: &Captures<'_>) -> Option<NaiveDate> {
    let month = month_number(caps.name("mon")?.as_str())?;
    let day = caps.name("d")?.as_str().parse().ok()?;
    let year = expand_year(caps.name("y")?.as_str())?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Two-digit years are read as 20xx.
fn expand_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    Some(if raw.len() == 2 { 2000 + year } else { year })
}

fn month_number(abbr: &str) -> Option<u32> {
    let month = match abbr.to_ascii_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}
