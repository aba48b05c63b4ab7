//! Permalink patterns and output paths.

use super::entry::ContentEntry;
use chrono::Datelike;
use std::path::{Component, Path, PathBuf};

/// Permalink for a standalone page at the content root.
pub const PAGE_PERMALINK: &str = "/:slug/";

/// Resolve an entry's permalink. A front-matter `permalink` wins; otherwise
/// `pattern` is expanded. Date tokens expand to nothing for undated entries.
pub fn resolve(entry: &ContentEntry, pattern: &str) -> String {
    let raw = if entry.permalink.is_empty() {
        let (year, month, day) = match entry.date {
            Some(d) => (
                format!("{:04}", d.year()),
                format!("{:02}", d.month()),
                format!("{:02}", d.day()),
            ),
            None => Default::default(),
        };
        pattern
            .replace(":collection", &entry.collection)
            .replace(":slug", &entry.slug)
            .replace(":year", &year)
            .replace(":month", &month)
            .replace(":day", &day)
    } else {
        entry.permalink.clone()
    };
    normalize(&raw)
}

/// Leading slash, no empty segments.
fn normalize(raw: &str) -> String {
    let trailing = raw.ends_with('/');
    let segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return "/".to_string();
    }
    let mut out = format!("/{}", segments.join("/"));
    if trailing {
        out.push('/');
    }
    out
}

/// File a permalink is written to under `output_dir`.
///
/// `/blog/hello/` maps to `blog/hello/index.html`; a permalink naming a file
/// (`/feed.xml`, `/404.html`) maps to that file. `..` and `.` segments are
/// dropped so every output stays inside `output_dir`.
pub fn output_path(output_dir: &Path, permalink: &str) -> PathBuf {
    let mut path = output_dir.to_path_buf();
    for component in Path::new(permalink.trim_start_matches('/')).components() {
        if let Component::Normal(part) = component {
            path.push(part);
        }
    }
    let names_file = !permalink.ends_with('/')
        && Path::new(permalink)
            .extension()
            .is_some_and(|ext| matches!(ext.to_str(), Some("html" | "htm" | "xml")));
    if !names_file {
        path.push("index.html");
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::entry::BodyRange;
    use chrono::NaiveDate;

    fn entry(collection: &str, slug: &str) -> ContentEntry {
        ContentEntry::new("x.md", collection, slug, BodyRange::default())
    }

    #[test]
    fn default_collection_pattern() {
        let e = entry("blog", "hello");
        assert_eq!(resolve(&e, "/:collection/:slug/"), "/blog/hello/");
    }

    #[test]
    fn date_tokens() {
        let mut e = entry("blog", "hello");
        e.date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(0, 0, 0);
        assert_eq!(resolve(&e, "/:year/:month/:day/:slug/"), "/2024/03/09/hello/");
    }

    #[test]
    fn undated_entry_collapses_date_segments() {
        let e = entry("blog", "hello");
        assert_eq!(resolve(&e, "/:year/:month/:slug/"), "/hello/");
    }

    #[test]
    fn override_wins() {
        let mut e = entry("blog", "hello");
        e.permalink = "custom/path".to_string();
        assert_eq!(resolve(&e, "/:collection/:slug/"), "/custom/path");
    }

    #[test]
    fn standalone_page() {
        assert_eq!(resolve(&entry("", "about"), PAGE_PERMALINK), "/about/");
    }

    // =========================================================================
    // output_path
    // =========================================================================

    #[test]
    fn directory_permalink_gets_index() {
        let out = output_path(Path::new("/out"), "/blog/hello/");
        assert_eq!(out, PathBuf::from("/out/blog/hello/index.html"));
    }

    #[test]
    fn file_permalink_is_used_as_is() {
        assert_eq!(output_path(Path::new("/out"), "/404.html"), PathBuf::from("/out/404.html"));
    }

    #[test]
    fn root_permalink() {
        assert_eq!(output_path(Path::new("/out"), "/"), PathBuf::from("/out/index.html"));
    }

    #[test]
    fn parent_segments_cannot_escape() {
        let out = output_path(Path::new("/out"), "/../../etc/x/");
        assert_eq!(out, PathBuf::from("/out/etc/x/index.html"));
    }
}
