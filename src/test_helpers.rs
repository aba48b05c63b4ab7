//! Shared test utilities for the pressroom test suite.
//!
//! Builds small content trees on disk and provides lookups over build
//! results that panic with a clear message on miss.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_site();
//! let content = tmp.path().join("content");
//! let blog = content.join("blog");
//! write_entry(&blog, "2024-05-01-new.md", "New", "More text.");
//!
//! let tasks = collect_tasks(&content, &tmp.path().join("out"));
//! let task = find_task(&tasks, "new");
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::build::BuildTask;
use crate::content::permalink::{self, PAGE_PERMALINK};
use crate::content::ContentParser;

// =========================================================================
// Fixture setup
// =========================================================================

/// A temp dir holding `content/` with a site config, a `blog` collection of
/// two dated posts, one standalone page and a local `entry.html` template.
pub fn setup_site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let content = tmp.path().join("content");
    fs::create_dir_all(&content).unwrap();
    fs::write(content.join("config.yaml"), "title: Test Site\n").unwrap();

    let blog = write_collection(&content, "blog", "title: Blog\n");
    write_entry(&blog, "2024-01-10-first.md", "First Post", "Hello *world*.");
    write_entry(&blog, "2024-02-20-second.md", "Second Post", "## Part\n\nMore.");
    write_entry(&content, "about.md", "About", "About this site.");

    write_template(
        &content.join("templates"),
        "entry.html",
        "<html><head><title>{{ title }}</title></head><body>{{ content }}</body></html>\n",
    );
    tmp
}

/// Create `<content>/<name>/_collection.yaml` and return the collection dir.
pub fn write_collection(content: &Path, name: &str, yaml: &str) -> PathBuf {
    let dir = content.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("_collection.yaml"), yaml).unwrap();
    dir
}

/// Write a Markdown entry with a `title` front matter and the given body.
pub fn write_entry(dir: &Path, file: &str, title: &str, body: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(file);
    fs::write(&path, format!("---\ntitle: {title}\n---\n{body}\n")).unwrap();
    path
}

/// Write a template file, creating the directory if needed.
pub fn write_template(dir: &Path, name: &str, body: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

// =========================================================================
// Task lookups (panic with a clear message on a miss)
// =========================================================================

/// Every collection entry and standalone page of `content` as a build task
/// into `output`, without any filtering.
pub fn collect_tasks(content: &Path, output: &Path) -> Vec<BuildTask> {
    let parser = ContentParser::new(content);
    let mut tasks = Vec::new();
    for collection in parser.collections().unwrap() {
        for entry in parser.entries(&collection).unwrap() {
            let link = permalink::resolve(&entry, &collection.permalink);
            tasks.push(BuildTask::new(entry, permalink::output_path(output, &link)));
        }
    }
    for entry in parser.standalone_pages().unwrap() {
        let link = permalink::resolve(&entry, PAGE_PERMALINK);
        tasks.push(BuildTask::new(entry, permalink::output_path(output, &link)));
    }
    tasks
}

/// Find a task by entry slug. Panics if not found.
pub fn find_task<'a>(tasks: &'a [BuildTask], slug: &str) -> &'a BuildTask {
    tasks
        .iter()
        .find(|t| t.entry.slug == slug)
        .unwrap_or_else(|| {
            let slugs: Vec<&str> = tasks.iter().map(|t| t.entry.slug.as_str()).collect();
            panic!("task '{slug}' not found. Available: {slugs:?}")
        })
}

/// All files under `dir`, relative and sorted.
pub fn list_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(dir)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

/// Read an output file. Panics with the path on failure.
pub fn read_output(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()))
}
