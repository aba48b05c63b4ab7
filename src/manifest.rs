//! Build manifest: which source produced which outputs, at which content hash.
//!
//! The manifest is what makes a build incremental. After a successful build
//! every rendered source is recorded with its current content hash and the
//! output files it produced. On the next build:
//!
//! - [`BuildManifest::changed_files`] narrows the source list to files that are
//!   new, modified, or no longer readable;
//! - [`BuildManifest::stale_outputs`] lists outputs whose source has gone away
//!   (deleted or renamed), so the build can delete them;
//! - [`BuildManifest::prune`] forgets those sources.
//!
//! ## Storage
//!
//! A single JSON object mapping absolute source paths to
//! `{ "hash": "<hex>", "outputs": ["<path>", ...] }`, pretty-printed with keys
//! in sorted order so that diffs between builds stay readable.
//!
//! A missing or unparsable manifest loads as empty. Incremental builds are an
//! optimization: the worst outcome of losing the manifest is a full rebuild.
//!
//! Files that feed every page (site config, collection configs, templates)
//! are not sources and never appear in the manifest. Their hashes live in an
//! [`InputSnapshot`] stored next to it.

use crate::hash;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Recorded state of one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Content hash of the source at the last successful build.
    pub hash: String,
    /// Output files produced from the source, in production order.
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BuildManifest {
    path: PathBuf,
    entries: BTreeMap<String, ManifestEntry>,
}

/// Manifest location for an output directory under the cache root.
///
/// Each output directory gets its own manifest so that building the same
/// content into two places does not make either build think the other's
/// outputs are current.
pub fn manifest_path_for(cache_root: &Path, output_dir: &Path) -> PathBuf {
    let tag = hash::hash_bytes(output_dir.to_string_lossy().as_bytes());
    cache_root.join(format!("build-manifest-{tag}.json"))
}

/// Snapshot location for an output directory, next to its manifest.
pub fn inputs_path_for(cache_root: &Path, output_dir: &Path) -> PathBuf {
    let tag = hash::hash_bytes(output_dir.to_string_lossy().as_bytes());
    cache_root.join(format!("build-inputs-{tag}.json"))
}

fn key(source: &Path) -> String {
    source.to_string_lossy().into_owned()
}

/// Read a JSON map from `path`; `None` when absent or malformed.
fn load_map<V: DeserializeOwned>(path: &Path, what: &str) -> Option<BTreeMap<String, V>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "unreadable {what}, starting fresh");
            }
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(map) => Some(map),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed {what}, starting fresh");
            None
        }
    }
}

fn save_map<V: Serialize>(path: &Path, map: &BTreeMap<String, V>) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(map)?;
    std::fs::write(path, json)
}

impl BuildManifest {
    /// An empty manifest that will be saved to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load from `path`. Returns an empty manifest if the file doesn't exist
    /// or doesn't contain a JSON object of the expected shape.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match load_map(&path, "build manifest") {
            Some(entries) => {
                debug!(path = %path.display(), sources = entries.len(), "loaded build manifest");
                Self { path, entries }
            }
            None => Self::empty(path),
        }
    }

    /// Write to the manifest path, creating parent directories as needed.
    pub fn save(&self) -> io::Result<()> {
        save_map(&self.path, &self.entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &BTreeMap<String, ManifestEntry> {
        &self.entries
    }

    pub fn get(&self, source: &Path) -> Option<&ManifestEntry> {
        self.entries.get(&key(source))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `source` needs rebuilding: untracked, gone from disk, or its
    /// content hash differs from the recorded one.
    pub fn is_changed(&self, source: &Path) -> bool {
        let Some(entry) = self.entries.get(&key(source)) else {
            return true;
        };
        match hash::hash_file(source) {
            Ok(current) => entry.hash != current.to_hex(),
            Err(_) => true,
        }
    }

    /// Record `source` with its current content hash and the outputs it
    /// produced, replacing any previous entry.
    pub fn record(&mut self, source: &Path, outputs: &[PathBuf]) -> io::Result<()> {
        let hash = hash::hash_file(source)?;
        self.entries.insert(
            key(source),
            ManifestEntry {
                hash: hash.to_hex(),
                outputs: outputs.iter().map(|p| key(p)).collect(),
            },
        );
        Ok(())
    }

    /// Outputs of every tracked source that is not in `current`.
    pub fn stale_outputs(&self, current: &[PathBuf]) -> Vec<PathBuf> {
        let current: HashSet<String> = current.iter().map(|p| key(p)).collect();
        self.entries
            .iter()
            .filter(|(source, _)| !current.contains(*source))
            .flat_map(|(_, entry)| entry.outputs.iter().map(PathBuf::from))
            .collect()
    }

    /// Forget every tracked source that is not in `current`. Returns the
    /// number of entries removed.
    pub fn prune(&mut self, current: &[PathBuf]) -> usize {
        let current: HashSet<String> = current.iter().map(|p| key(p)).collect();
        let before = self.entries.len();
        self.entries.retain(|source, _| current.contains(source));
        before - self.entries.len()
    }

    /// [`stale_outputs`](Self::stale_outputs) followed by
    /// [`prune`](Self::prune): returns the outputs of vanished sources and
    /// drops their entries.
    pub fn removed_outputs(&mut self, current: &[PathBuf]) -> Vec<PathBuf> {
        let stale = self.stale_outputs(current);
        self.prune(current);
        stale
    }

    /// The subset of `current` that [`is_changed`](Self::is_changed), in
    /// input order.
    pub fn changed_files(&self, current: &[PathBuf]) -> Vec<PathBuf> {
        current
            .iter()
            .filter(|source| self.is_changed(source))
            .cloned()
            .collect()
    }
}

/// Content hashes of the build's config inputs at the last successful build.
///
/// Any difference (an input added, removed, or edited) means every page may
/// render differently, so the build goes full.
#[derive(Debug, Clone)]
pub struct InputSnapshot {
    path: PathBuf,
    hashes: BTreeMap<String, String>,
}

impl InputSnapshot {
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            hashes: BTreeMap::new(),
        }
    }

    /// Load from `path`, empty when missing or malformed.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let hashes = load_map(&path, "input snapshot").unwrap_or_default();
        Self { path, hashes }
    }

    pub fn save(&self) -> io::Result<()> {
        save_map(&self.path, &self.hashes)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Replace the snapshot with the current hashes of `inputs`. Unreadable
    /// inputs are left out, so the next build sees them as changed.
    pub fn capture(&mut self, inputs: &[PathBuf]) {
        self.hashes.clear();
        for input in inputs {
            match hash::hash_file(input) {
                Ok(h) => {
                    self.hashes.insert(key(input), h.to_hex());
                }
                Err(e) => warn!(path = %input.display(), error = %e, "cannot hash config input"),
            }
        }
    }

    /// Inputs that are new, edited or unreadable, followed by recorded
    /// inputs missing from `inputs`.
    pub fn changed(&self, inputs: &[PathBuf]) -> Vec<PathBuf> {
        let mut changed: Vec<PathBuf> = inputs
            .iter()
            .filter(|input| match (self.hashes.get(&key(input)), hash::hash_file(input)) {
                (Some(recorded), Ok(current)) => *recorded != current.to_hex(),
                _ => true,
            })
            .cloned()
            .collect();
        let current: HashSet<String> = inputs.iter().map(|p| key(p)).collect();
        changed.extend(
            self.hashes
                .keys()
                .filter(|k| !current.contains(*k))
                .map(PathBuf::from),
        );
        changed
    }
}
