//! # Pressroom
//!
//! An incremental static site builder. Markdown entries with YAML front matter
//! are rendered through HTML templates into a static output directory, and
//! repeat builds only redo the work their inputs demand.
//!
//! # Architecture
//!
//! A build moves through four steps:
//!
//! ```text
//! 1. Collect   content/        →  build tasks      (entries + output paths)
//! 2. Select    manifest diff   →  tasks to render  (full or incremental)
//! 3. Render    worker shares   →  output/          (cache hit or fresh render)
//! 4. Record    written outputs →  manifest         (source → hash + outputs)
//! ```
//!
//! Two stores make step 2 and step 3 cheap:
//!
//! - The **build manifest** remembers, per source file, the content hash seen
//!   last time and the outputs it produced. Diffing it against the current
//!   tree yields changed sources and outputs that no longer have a source.
//! - The **render cache** stores rendered HTML keyed on the entry's body hash
//!   combined with the hash of every template and site config file. A page
//!   whose inputs are unchanged is copied out of the cache instead of being
//!   rendered again.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`hash`] | 128-bit content hashes of bytes and files |
//! | [`cache`] | On-disk render cache and hit/miss statistics |
//! | [`manifest`] | Build manifest: source hashes, outputs, stale detection |
//! | [`naming`] | `YYYY-MM-DD-slug` filename convention and date parsing |
//! | [`content`] | Content directory parsing: site config, collections, entries, permalinks |
//! | [`render`] | Body processors, templates, and the caching entry renderer |
//! | [`build`] | Build pipeline and the parallel worker coordinator |
//! | [`config`] | Layered `pressroom.toml` loading and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Parallel Builds
//!
//! With more than one worker, tasks are split round-robin and each share is
//! rendered in a separate process (`pressroom render-worker`) that reads its
//! job as JSON on stdin and answers with a JSON report on stdout. A crashing
//! or hanging worker cannot take the parent down with it; the parent collects
//! every failure and reports them together.

pub mod build;
pub mod cache;
pub mod config;
pub mod content;
pub mod hash;
pub mod manifest;
pub mod naming;
pub mod output;
pub mod render;

#[cfg(test)]
pub(crate) mod test_helpers;
