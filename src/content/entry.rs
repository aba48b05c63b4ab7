//! A content entry with a lazily read body.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Byte range of an entry's body inside its source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyRange {
    pub offset: u64,
    pub length: u64,
}

/// One piece of content (a post, a page) parsed from a Markdown file.
///
/// Only the front matter is held in memory. The body stays on disk as a
/// [`BodyRange`] and is read by [`ContentEntry::body`] when the entry is
/// actually rendered, so enumerating thousands of entries stays cheap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub source: PathBuf,
    /// Collection name; empty for standalone pages at the content root.
    pub collection: String,
    pub slug: String,
    pub title: String,
    pub date: Option<NaiveDateTime>,
    pub draft: bool,
    /// Permalink from front matter; empty means "derive from the collection".
    pub permalink: String,
    /// Template name from front matter; empty means the default layout.
    pub layout: String,
    pub tags: Vec<String>,
    pub summary: String,
    body: BodyRange,
}

impl ContentEntry {
    /// Entry with the given identity and body range and no metadata beyond it.
    pub fn new(source: impl Into<PathBuf>, collection: &str, slug: &str, body: BodyRange) -> Self {
        Self {
            source: source.into(),
            collection: collection.to_string(),
            slug: slug.to_string(),
            title: String::new(),
            date: None,
            draft: false,
            permalink: String::new(),
            layout: String::new(),
            tags: Vec::new(),
            summary: String::new(),
            body,
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source
    }

    pub fn body_range(&self) -> BodyRange {
        self.body
    }

    /// Read the body from the source file.
    pub fn body(&self) -> io::Result<String> {
        if self.body.length == 0 {
            return Ok(String::new());
        }
        let mut file = File::open(&self.source)?;
        file.seek(SeekFrom::Start(self.body.offset))?;
        let mut buf = Vec::with_capacity(self.body.length as usize);
        file.take(self.body.length).read_to_end(&mut buf)?;
        String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Whether the entry belongs in a build that may or may not include
    /// drafts and future-dated entries.
    pub fn is_publishable(&self, now: NaiveDateTime, include_drafts: bool, include_future: bool) -> bool {
        if self.draft && !include_drafts {
            return false;
        }
        match self.date {
            Some(date) if date > now => include_future,
            _ => true,
        }
    }
}
