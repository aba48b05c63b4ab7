//! Filename and date conventions for content entries.
//!
//! Entry files may carry their publish date in the name:
//!
//! - `2024-03-09-hello-world.md` → date 2024-03-09, slug `hello-world`
//! - `about.md` → no date, slug `about`
//!
//! A date in front matter always wins over the filename date; see
//! [`crate::content::front_matter`].

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Result of parsing an entry file stem like `2024-03-09-hello-world`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedName {
    /// Date prefix if present.
    pub date: Option<NaiveDateTime>,
    /// Slug: the rest of the stem after the date, or the whole stem.
    pub slug: String,
}

/// Parse an entry file stem following the `YYYY-MM-DD-slug` convention.
///
/// The date prefix only counts if it is a valid calendar date followed by a
/// dash and a non-empty slug; otherwise the whole stem is the slug.
pub fn parse_entry_name(stem: &str) -> ParsedName {
    if let (Some(prefix), Some(b'-')) = (stem.get(..10), stem.as_bytes().get(10))
        && stem.len() > 11
        && let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
    {
        return ParsedName {
            date: date.and_hms_opt(0, 0, 0),
            slug: stem[11..].to_string(),
        };
    }
    ParsedName {
        date: None,
        slug: stem.to_string(),
    }
}

/// Parse a front-matter date.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM[:SS]`, `YYYY-MM-DDTHH:MM[:SS]` and
/// RFC 3339 with an offset (the offset is dropped after converting to the
/// naive local time written in the file).
pub fn parse_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
