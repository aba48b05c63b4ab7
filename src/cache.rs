//! Render cache for incremental builds.
//!
//! Markdown rendering and syntax highlighting dominate the cost of a build.
//! This module lets the renderer skip the whole processor pipeline and the
//! template step when neither the source file nor any template has changed
//! since the HTML was last produced.
//!
//! # Design
//!
//! The cache is **content-addressed**: the key for an entry is derived from
//! the bytes of its source file and the bytes of every active template, not
//! from the source path or the output path. Renaming a file or changing its
//! permalink does not invalidate the cached HTML; editing it does.
//!
//! ## Cache keys
//!
//! - **template-set hash**: computed once when the cache is opened. Template
//!   paths are sorted lexicographically, each file is hashed, the hex digests
//!   are concatenated in that order and hashed once more. No templates at all
//!   gives the hash of the empty string.
//! - **key**: `combine(hash(source bytes), template-set hash)`, hex-encoded.
//!
//! Any template edit anywhere changes the template-set hash and therefore
//! every key. There is no per-template dependency tracking.
//!
//! ## Storage
//!
//! A flat directory of files, one per key, each holding the raw rendered HTML.
//! There is no index: the presence of `<cache_dir>/<key>` is the only
//! metadata. Entries never expire; [`RenderCache::clear`] or deleting the
//! directory removes them.
//!
//! Writes go to a process-unique temporary name and are renamed into place,
//! so a reader never observes a half-written entry even if a worker is
//! killed mid-write.
//!
//! ## Bypassing the cache
//!
//! Pass `--no-cache` to `build` to render every entry from scratch. No cache
//! handle is created and the cache directory is left untouched.

use crate::hash::{self, ContentHash};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Key of a cached render: hex digest naming a file in the cache directory.
pub type CacheKey = String;

/// Hash a set of template files into a single fingerprint.
///
/// Paths are sorted first so the result does not depend on the order the
/// filesystem listed them in.
pub fn template_set_hash(template_files: &[PathBuf]) -> Result<ContentHash, CacheError> {
    let mut sorted: Vec<&PathBuf> = template_files.iter().collect();
    sorted.sort();

    let mut digests = String::with_capacity(sorted.len() * ContentHash::HEX_LEN);
    for path in sorted {
        let h = hash::hash_file(path).map_err(|e| CacheError::io(path, e))?;
        digests.push_str(&h.to_hex());
    }
    Ok(hash::hash_bytes(digests.as_bytes()))
}

/// Content-addressed store of rendered HTML.
#[derive(Debug, Clone)]
pub struct RenderCache {
    cache_dir: PathBuf,
    template_hash: ContentHash,
}

impl RenderCache {
    /// Open (creating if needed) a cache directory and fingerprint the
    /// given template files.
    pub fn new(cache_dir: impl Into<PathBuf>, template_files: &[PathBuf]) -> Result<Self, CacheError> {
        let template_hash = template_set_hash(template_files)?;
        Self::with_template_hash(cache_dir, template_hash)
    }

    /// Open a cache with a template-set hash computed elsewhere.
    ///
    /// Workers use this so the templates are hashed once by the coordinator
    /// instead of once per worker.
    pub fn with_template_hash(
        cache_dir: impl Into<PathBuf>,
        template_hash: ContentHash,
    ) -> Result<Self, CacheError> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir).map_err(|e| CacheError::io(&cache_dir, e))?;
        Ok(Self {
            cache_dir,
            template_hash,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn template_hash(&self) -> ContentHash {
        self.template_hash
    }

    /// Compute the cache key for a source file's current content.
    ///
    /// Returns `None` when the source cannot be read.
    pub fn key_for(&self, source: &Path) -> Option<CacheKey> {
        let file_hash = hash::hash_file(source).ok()?;
        Some(hash::combine(file_hash, self.template_hash).to_hex())
    }

    /// Look up previously rendered HTML for a source file. A missing entry
    /// or an unreadable source is a miss.
    pub fn get(&self, source: &Path) -> Option<String> {
        let key = self.key_for(source)?;
        match fs::read_to_string(self.cache_dir.join(&key)) {
            Ok(html) => Some(html),
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!(key = %key, error = %e, "unreadable cache entry treated as miss");
                }
                None
            }
        }
    }

    /// Store rendered HTML for a source file, replacing any previous entry
    /// with the same key.
    pub fn set(&self, source: &Path, html: &str) -> Result<(), CacheError> {
        let file_hash = hash::hash_file(source).map_err(|e| CacheError::io(source, e))?;
        let key = hash::combine(file_hash, self.template_hash).to_hex();
        let target = self.cache_dir.join(&key);
        let tmp = self
            .cache_dir
            .join(format!(".{}.tmp-{}", key, std::process::id()));
        fs::write(&tmp, html).map_err(|e| CacheError::io(&tmp, e))?;
        fs::rename(&tmp, &target).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            CacheError::io(&target, e)
        })
    }

    /// Delete every file directly inside the cache directory. Returns the
    /// number of files removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(CacheError::io(&self.cache_dir, e)),
        };
        let mut removed = 0;
        for entry in entries {
            let path = entry.map_err(|e| CacheError::io(&self.cache_dir, e))?.path();
            if path.is_file() {
                fs::remove_file(&path).map_err(|e| CacheError::io(&path, e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Summary of cache performance for one renderer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }

    /// Fold another renderer's counters into this one.
    pub fn merge(&mut self, other: CacheStats) {
        self.hits += other.hits;
        self.misses += other.misses;
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} rendered ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} rendered", self.misses)
        }
    }
}
