//! YAML front matter reader.
//!
//! Reads only the header of a Markdown file and records where the body
//! starts, so the body can be loaded later through [`BodyRange`]:
//!
//! ```text
//! ---
//! title: Hello
//! date: 2024-03-09
//! ---
//! Body starts here.
//! ```
//!
//! When the front matter has no `title`, a `# Heading` in the first two
//! non-blank body lines becomes the title and is cut from the body.
//!
//! Invalid YAML yields empty front matter rather than an error; a post with a
//! typo in its header still renders, it just loses its metadata.

use super::entry::BodyRange;
use serde_yaml_ng::Value;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;
use tracing::warn;

const DELIMITER: &str = "---";

/// Header fields recognized in front matter. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub date: Option<String>,
    pub draft: bool,
    pub slug: Option<String>,
    pub permalink: Option<String>,
    pub layout: Option<String>,
    pub tags: Vec<String>,
    pub summary: Option<String>,
}

/// Front matter plus the location of the body that follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFile {
    pub front_matter: FrontMatter,
    pub body: BodyRange,
}

/// Read the header of `path`.
pub fn parse_file(path: &Path) -> io::Result<ParsedFile> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut line = Vec::new();
    let first = reader.read_until(b'\n', &mut line)?;
    if first == 0 || !String::from_utf8_lossy(&line).trim().starts_with(DELIMITER) {
        return finish(reader, path, FrontMatter::default(), 0, file_len);
    }

    let mut consumed = first as u64;
    let mut yaml = String::new();
    let mut closed = false;
    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            break;
        }
        consumed += n as u64;
        let text = String::from_utf8_lossy(&line);
        if text.trim().starts_with(DELIMITER) {
            closed = true;
            break;
        }
        yaml.push_str(&text);
    }

    if !closed {
        // An opening delimiter with no closing one is plain content.
        return Ok(ParsedFile {
            front_matter: FrontMatter::default(),
            body: BodyRange {
                offset: 0,
                length: file_len,
            },
        });
    }

    let front_matter = parse_yaml(&yaml, path);
    finish(reader, path, front_matter, consumed, file_len)
}

fn finish(
    mut reader: BufReader<File>,
    path: &Path,
    mut front_matter: FrontMatter,
    body_start: u64,
    file_len: u64,
) -> io::Result<ParsedFile> {
    let mut offset = body_start;
    if front_matter.title.is_none() {
        if let Some((title, after)) = heading_title(&mut reader, body_start)? {
            front_matter.title = Some(title);
            offset = after;
        }
    }
    if front_matter.title.is_none() {
        tracing::debug!(path = %path.display(), "no title in front matter or heading");
    }
    Ok(ParsedFile {
        front_matter,
        body: BodyRange {
            offset,
            length: file_len.saturating_sub(offset),
        },
    })
}

/// Look for `# Title` in the first two non-blank lines after `start`.
/// Returns the title and the offset just past the heading line.
fn heading_title(reader: &mut BufReader<File>, start: u64) -> io::Result<Option<(String, u64)>> {
    reader.seek(SeekFrom::Start(start))?;
    let mut pos = start;
    let mut non_blank = 0;
    let mut line = Vec::new();
    while non_blank < 2 {
        line.clear();
        let n = reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            break;
        }
        pos += n as u64;
        let text = String::from_utf8_lossy(&line);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        non_blank += 1;
        if let Some(title) = trimmed.strip_prefix("# ") {
            let title = title.trim();
            if !title.is_empty() {
                return Ok(Some((title.to_string(), pos)));
            }
        }
    }
    Ok(None)
}

fn parse_yaml(yaml: &str, path: &Path) -> FrontMatter {
    if yaml.trim().is_empty() {
        return FrontMatter::default();
    }
    let value: Value = match serde_yaml_ng::from_str(yaml) {
        Ok(v) => v,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "invalid front matter, ignoring it");
            return FrontMatter::default();
        }
    };
    let Value::Mapping(map) = value else {
        warn!(path = %path.display(), "front matter is not a mapping, ignoring it");
        return FrontMatter::default();
    };

    let field = |key: &str| map.get(key).and_then(scalar);
    FrontMatter {
        title: field("title").filter(|s| !s.is_empty()),
        date: field("date"),
        draft: map.get("draft").is_some_and(truthy),
        slug: field("slug").filter(|s| !s.is_empty()),
        permalink: field("permalink").filter(|s| !s.is_empty()),
        layout: field("layout").filter(|s| !s.is_empty()),
        tags: match map.get("tags") {
            Some(Value::Sequence(items)) => items.iter().filter_map(scalar).collect(),
            Some(other) => scalar(other)
                .map(|s| {
                    s.split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            None => Vec::new(),
        },
        summary: field("summary"),
    }
}

/// Scalars as strings; numbers and booleans are stringified.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}
