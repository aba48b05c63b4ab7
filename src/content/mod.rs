//! Content tree parsing.
//!
//! A content directory looks like:
//!
//! ```text
//! content/
//! ├── config.yaml                  # SiteConfig
//! ├── about.md                     # standalone page → /about/
//! ├── templates/                   # local theme, highest priority
//! │   └── entry.html
//! └── blog/
//!     ├── _collection.yaml         # makes blog/ a collection
//!     ├── 2024-03-09-hello.md      # dated entry, slug "hello"
//!     └── draft-idea.md
//! ```
//!
//! Parsing reads only front matter; bodies stay on disk until rendering
//! (see [`ContentEntry::body`]).

pub mod entry;
pub mod front_matter;
pub mod permalink;
pub mod site;

pub use entry::{BodyRange, ContentEntry};
pub use site::{Collection, SiteConfig};

use crate::naming::{parse_date, parse_entry_name};
use site::{COLLECTION_CONFIG_FILE, SITE_CONFIG_FILE};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },
}

/// Directory name of the local theme inside the content root.
pub const TEMPLATES_DIR: &str = "templates";

/// Reads a content directory into entries.
#[derive(Debug, Clone)]
pub struct ContentParser {
    content_dir: PathBuf,
}

impl ContentParser {
    pub fn new(content_dir: impl Into<PathBuf>) -> Self {
        Self {
            content_dir: content_dir.into(),
        }
    }

    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    pub fn site_config(&self) -> SiteConfig {
        SiteConfig::load(&self.content_dir)
    }

    /// Every direct subdirectory holding a `_collection.yaml`, sorted by name.
    pub fn collections(&self) -> Result<Vec<Collection>, ContentError> {
        let mut collections = Vec::new();
        for dir in self.children(|e| e.file_type().is_dir())? {
            if dir.join(COLLECTION_CONFIG_FILE).is_file() {
                collections.push(Collection::load(&dir)?);
            }
        }
        Ok(collections)
    }

    /// Markdown entries of one collection, sorted by file name.
    pub fn entries(&self, collection: &Collection) -> Result<Vec<ContentEntry>, ContentError> {
        let dir = self.content_dir.join(&collection.name);
        markdown_files(&dir)?
            .into_iter()
            .map(|path| parse_entry(&path, &collection.name))
            .collect()
    }

    /// Top-level Markdown files, which become standalone pages.
    pub fn standalone_pages(&self) -> Result<Vec<ContentEntry>, ContentError> {
        markdown_files(&self.content_dir)?
            .into_iter()
            .map(|path| parse_entry(&path, ""))
            .collect()
    }

    /// Content files whose change invalidates every entry: `config.yaml`
    /// (when present) and each collection's `_collection.yaml`.
    pub fn config_files(&self, collections: &[Collection]) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let site = self.content_dir.join(SITE_CONFIG_FILE);
        if site.is_file() {
            files.push(site);
        }
        files.extend(
            collections
                .iter()
                .map(|c| self.content_dir.join(&c.name).join(COLLECTION_CONFIG_FILE)),
        );
        files
    }

    /// `<content>/templates` if it exists.
    pub fn local_templates(&self) -> Option<PathBuf> {
        let dir = self.content_dir.join(TEMPLATES_DIR);
        dir.is_dir().then_some(dir)
    }

    fn children(&self, keep: impl Fn(&walkdir::DirEntry) -> bool) -> Result<Vec<PathBuf>, ContentError> {
        list_dir(&self.content_dir, keep)
    }
}

fn markdown_files(dir: &Path) -> Result<Vec<PathBuf>, ContentError> {
    list_dir(dir, |e| {
        e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "md")
    })
}

/// Direct children of `dir` passing `keep`, sorted by name. Names starting
/// with `.` or `_` are skipped.
fn list_dir(dir: &Path, keep: impl Fn(&walkdir::DirEntry) -> bool) -> Result<Vec<PathBuf>, ContentError> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| ContentError::Io {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') || name.starts_with('_') {
            continue;
        }
        if keep(&entry) {
            out.push(entry.into_path());
        }
    }
    Ok(out)
}

/// Parse one Markdown file into an entry of `collection`.
///
/// Front matter `slug` and `date` override what the filename says.
pub fn parse_entry(path: &Path, collection: &str) -> Result<ContentEntry, ContentError> {
    let parsed = front_matter::parse_file(path).map_err(|source| ContentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = parse_entry_name(&stem);
    let fm = parsed.front_matter;

    let date = match fm.date.as_deref() {
        Some(raw) => parse_date(raw).or_else(|| {
            tracing::warn!(path = %path.display(), date = raw, "unparseable date, ignoring it");
            name.date
        }),
        None => name.date,
    };

    let mut entry = ContentEntry::new(
        path,
        collection,
        fm.slug.as_deref().unwrap_or(&name.slug),
        parsed.body,
    );
    entry.title = fm.title.unwrap_or_default();
    entry.date = date;
    entry.draft = fm.draft;
    entry.permalink = fm.permalink.unwrap_or_default();
    entry.layout = fm.layout.unwrap_or_default();
    entry.tags = fm.tags;
    entry.summary = fm.summary.unwrap_or_default();
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use chrono::Datelike;
    use tempfile::TempDir;

    #[test]
    fn finds_collections_sorted() {
        let tmp = TempDir::new().unwrap();
        let content = tmp.path();
        write_collection(content, "notes", "");
        write_collection(content, "blog", "");
        std::fs::create_dir(content.join("assets")).unwrap();

        let names: Vec<_> = ContentParser::new(content)
            .collections()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["blog", "notes"]);
    }

    #[test]
    fn entries_use_filename_date_and_slug() {
        let tmp = TempDir::new().unwrap();
        let content = tmp.path();
        let blog = write_collection(content, "blog", "");
        write_entry(&blog, "2024-03-09-hello.md", "Hello", "Body");

        let parser = ContentParser::new(content);
        let collections = parser.collections().unwrap();
        let entries = parser.entries(&collections[0]).unwrap();
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.slug, "hello");
        assert_eq!(e.title, "Hello");
        assert_eq!(e.collection, "blog");
        assert_eq!(e.date.map(|d| d.year()), Some(2024));
        assert_eq!(e.body().unwrap(), "Body\n");
    }

    #[test]
    fn front_matter_overrides_filename() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("2024-03-09-hello.md");
        std::fs::write(&path, "---\ntitle: T\nslug: other\ndate: 2020-01-02\n---\n").unwrap();
        let e = parse_entry(&path, "blog").unwrap();
        assert_eq!(e.slug, "other");
        assert_eq!(e.date.map(|d| d.year()), Some(2020));
    }

    #[test]
    fn standalone_pages_skip_non_markdown_and_hidden() {
        let tmp = TempDir::new().unwrap();
        let content = tmp.path();
        write_entry(content, "about.md", "About", "Me");
        write_entry(content, "_partial.md", "Hidden", "x");
        std::fs::write(content.join("config.yaml"), "title: S\n").unwrap();

        let pages = ContentParser::new(content).standalone_pages().unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].slug, "about");
        assert_eq!(pages[0].collection, "");
    }

    #[test]
    fn config_files_include_site_and_collections() {
        let tmp = TempDir::new().unwrap();
        let content = tmp.path();
        std::fs::write(content.join("config.yaml"), "title: S\n").unwrap();
        write_collection(content, "blog", "");

        let parser = ContentParser::new(content);
        let collections = parser.collections().unwrap();
        let files = parser.config_files(&collections);
        assert_eq!(
            files,
            vec![
                content.join("config.yaml"),
                content.join("blog").join("_collection.yaml")
            ]
        );
    }

    #[test]
    fn config_files_without_site_config() {
        let tmp = TempDir::new().unwrap();
        let parser = ContentParser::new(tmp.path());
        assert!(parser.config_files(&[]).is_empty());
    }

    #[test]
    fn local_templates_only_when_present() {
        let tmp = TempDir::new().unwrap();
        let parser = ContentParser::new(tmp.path());
        assert_eq!(parser.local_templates(), None);
        std::fs::create_dir(tmp.path().join("templates")).unwrap();
        assert_eq!(parser.local_templates(), Some(tmp.path().join("templates")));
    }
}
