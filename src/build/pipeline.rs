//! One `pressroom build` invocation.
//!
//! ```text
//! content/ ──parse──► entries ──filter──► tasks ──diff vs manifest──► changed tasks
//!                                                                        │
//!          manifest ◄──record + save── coordinator (workers) ◄───────────┘
//! ```
//!
//! ## Incremental rebuilds
//!
//! The manifest for the output directory remembers, for every source, its
//! content hash and the files it produced. On the next build:
//!
//! - If a *config input* changed (`config.yaml`, any `_collection.yaml`, any
//!   template file) or disappeared, every entry is rebuilt.
//! - Otherwise only sources whose hash changed, new sources, and sources
//!   whose output file is missing are rebuilt.
//! - Outputs of sources that no longer exist are deleted, and so are outputs
//!   of entries that turned into drafts or moved into the future.
//!
//! With caching disabled the output directory is wiped and everything is
//! rendered from scratch; the manifest is still written so the next cached
//! build starts incremental.

use super::coordinator::{Isolation, ParallelBuildCoordinator};
use super::worker::RenderJob;
use super::{BuildError, BuildTask};
use crate::cache::{CacheStats, RenderCache};
use crate::content::permalink::{self, PAGE_PERMALINK};
use crate::content::{ContentEntry, ContentParser, SiteConfig};
use crate::manifest::{BuildManifest, InputSnapshot, inputs_path_for, manifest_path_for};
use crate::render::TemplateResolver;
use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Subdirectory of the cache dir holding rendered HTML.
pub const RENDER_CACHE_DIR: &str = "render";

/// Settings for one build, resolved from config file and CLI flags.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub content_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Root for the render cache and the build manifests.
    pub cache_dir: PathBuf,
    /// Theme directories searched after `<content>/templates`.
    pub theme_dirs: Vec<PathBuf>,
    pub workers: usize,
    pub cache: bool,
    pub drafts: bool,
    pub future: bool,
    pub isolation: Isolation,
    pub worker_timeout: Option<Duration>,
    /// Reference time for excluding future-dated entries.
    pub now: NaiveDateTime,
}

impl BuildOptions {
    /// Sequential, cached, thread-isolated build with no theme dirs.
    pub fn new(content_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            content_dir: content_dir.into(),
            output_dir: output_dir.into(),
            cache_dir: cache_dir.into(),
            theme_dirs: Vec::new(),
            workers: 1,
            cache: true,
            drafts: false,
            future: false,
            isolation: Isolation::Threads,
            worker_timeout: None,
            now: chrono::Local::now().naive_local(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Config input changed or first build: every entry rendered.
    Full,
    /// Only changed sources rendered.
    Incremental,
    /// Cache disabled: output wiped and every entry rendered.
    Uncached,
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
            Self::Uncached => "uncached",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub mode: BuildMode,
    /// Pages written this run.
    pub written: usize,
    /// Publishable entries in the content tree.
    pub total: usize,
    pub stale_removed: usize,
    /// Entries without a title, which cannot be built.
    pub skipped: usize,
    /// Drafts and future-dated entries left out.
    pub filtered: usize,
    pub stats: CacheStats,
}

impl BuildReport {
    /// Nothing was written or removed.
    pub fn up_to_date(&self) -> bool {
        self.written == 0 && self.stale_removed == 0
    }
}

/// What a build would do, without doing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub mode: BuildMode,
    /// Files that would be written, sorted.
    pub writes: Vec<PathBuf>,
    /// Stale files that would be deleted, sorted.
    pub removes: Vec<PathBuf>,
}

/// Parsed content tree, before any manifest comparison.
struct Collected {
    site: SiteConfig,
    template_dirs: Vec<PathBuf>,
    /// `config.yaml`, `_collection.yaml` files and templates. A change to any
    /// of them affects every page.
    config_inputs: Vec<PathBuf>,
    tasks: Vec<BuildTask>,
    /// Drafts and future entries, recorded with no outputs.
    filtered: Vec<PathBuf>,
    skipped: usize,
}

impl Collected {
    /// Every path the manifest should keep an entry for.
    fn current_sources(&self) -> Vec<PathBuf> {
        self.tasks
            .iter()
            .map(|t| t.entry.source.clone())
            .chain(self.filtered.iter().cloned())
            .collect()
    }
}

/// Task selection against a manifest.
struct Selection {
    mode: BuildMode,
    tasks: Vec<BuildTask>,
    /// Outputs of filtered entries that a previous build wrote.
    unpublished: Vec<PathBuf>,
}

/// Absolute content and output dirs. The content dir must exist, and the
/// output dir may not hold the content or the cache, since an uncached build
/// wipes it.
fn resolve_dirs(opts: &BuildOptions) -> Result<(PathBuf, PathBuf), BuildError> {
    if !opts.content_dir.is_dir() {
        return Err(BuildError::ContentDirNotFound(opts.content_dir.clone()));
    }
    let content = fs::canonicalize(&opts.content_dir).map_err(|e| BuildError::io(&opts.content_dir, e))?;
    let output = std::path::absolute(&opts.output_dir).map_err(|e| BuildError::io(&opts.output_dir, e))?;

    let real_output = real_path(&output)?;
    for protected in [content.clone(), real_path(&opts.cache_dir)?] {
        if protected.starts_with(&real_output) {
            return Err(BuildError::UnsafeOutputDir {
                output: opts.output_dir.clone(),
                protected,
            });
        }
    }
    Ok((content, output))
}

/// Canonical path of the nearest existing ancestor with the rest appended,
/// so `.`, `..` and symlinks compare equal to what they point at.
fn real_path(path: &Path) -> Result<PathBuf, BuildError> {
    let absolute = std::path::absolute(path).map_err(|e| BuildError::io(path, e))?;
    let mut existing = absolute.as_path();
    let mut rest = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(absolute),
        }
    }
    let mut real = fs::canonicalize(existing).map_err(|e| BuildError::io(existing, e))?;
    real.extend(rest.iter().rev());
    Ok(real)
}

fn collect(content_dir: &Path, output_dir: &Path, opts: &BuildOptions) -> Result<Collected, BuildError> {
    let parser = ContentParser::new(content_dir);
    let site = parser.site_config();
    let collections = parser.collections()?;

    let template_dirs: Vec<PathBuf> = parser
        .local_templates()
        .into_iter()
        .chain(opts.theme_dirs.iter().cloned())
        .collect();
    let template_files = TemplateResolver::new(template_dirs.clone()).template_files();
    let mut config_inputs = parser.config_files(&collections);
    config_inputs.extend(template_files);

    let mut entries: Vec<(ContentEntry, String)> = Vec::new();
    for collection in &collections {
        for entry in parser.entries(collection)? {
            let link = permalink::resolve(&entry, &collection.permalink);
            entries.push((entry, link));
        }
    }
    for entry in parser.standalone_pages()? {
        let link = permalink::resolve(&entry, PAGE_PERMALINK);
        entries.push((entry, link));
    }

    let mut tasks = Vec::new();
    let mut filtered = Vec::new();
    let mut skipped = 0;
    let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
    for (entry, link) in entries {
        if entry.title.is_empty() {
            warn!(path = %entry.source.display(), "entry has no title, skipping");
            skipped += 1;
        } else if !entry.is_publishable(opts.now, opts.drafts, opts.future) {
            debug!(path = %entry.source.display(), "draft or future entry, not publishing");
            filtered.push(entry.source);
        } else {
            let output = permalink::output_path(output_dir, &link);
            if let Some(first) = claimed.insert(output.clone(), entry.source.clone()) {
                return Err(BuildError::DuplicateOutput {
                    output,
                    first,
                    second: entry.source,
                });
            }
            tasks.push(BuildTask::new(entry, output));
        }
    }

    Ok(Collected {
        site,
        template_dirs,
        config_inputs,
        tasks,
        filtered,
        skipped,
    })
}

fn select(collected: &Collected, manifest: &BuildManifest, inputs: &InputSnapshot, opts: &BuildOptions) -> Selection {
    if !opts.cache {
        return Selection {
            mode: BuildMode::Uncached,
            tasks: collected.tasks.clone(),
            unpublished: Vec::new(),
        };
    }

    let config_changed = inputs.changed(&collected.config_inputs);

    let unpublished = collected
        .filtered
        .iter()
        .filter_map(|source| manifest.get(source))
        .flat_map(|entry| entry.outputs.iter().map(PathBuf::from))
        .collect();

    if manifest.is_empty() || !config_changed.is_empty() {
        if !manifest.is_empty() {
            info!(changed = config_changed.len(), "configuration or templates changed, rebuilding everything");
        }
        return Selection {
            mode: BuildMode::Full,
            tasks: collected.tasks.clone(),
            unpublished,
        };
    }

    let sources: Vec<PathBuf> = collected.tasks.iter().map(|t| t.entry.source.clone()).collect();
    let changed: HashSet<PathBuf> = manifest.changed_files(&sources).into_iter().collect();
    let tasks = collected
        .tasks
        .iter()
        .filter(|t| changed.contains(&t.entry.source) || !t.output.exists())
        .cloned()
        .collect();
    Selection {
        mode: BuildMode::Incremental,
        tasks,
        unpublished,
    }
}

/// Run a build.
pub fn build(opts: &BuildOptions) -> Result<BuildReport, BuildError> {
    let (content_dir, output_dir) = resolve_dirs(opts)?;
    let collected = collect(&content_dir, &output_dir, opts)?;
    let (mut manifest, mut inputs) = load_state(opts, &output_dir);

    let selection = select(&collected, &manifest, &inputs, opts);
    let mut stale_removed = 0;
    if opts.cache {
        let mut stale = manifest.removed_outputs(&collected.current_sources());
        stale.extend(selection.unpublished.iter().cloned());
        stale_removed = remove_stale(&stale);
    } else if output_dir.exists() {
        info!(dir = %output_dir.display(), "cache disabled, clearing output directory");
        fs::remove_dir_all(&output_dir).map_err(|e| BuildError::io(&output_dir, e))?;
    }

    let mut report = BuildReport {
        mode: selection.mode,
        written: 0,
        total: collected.tasks.len(),
        stale_removed,
        skipped: collected.skipped,
        filtered: collected.filtered.len(),
        stats: CacheStats::default(),
    };
    if selection.tasks.is_empty() && stale_removed == 0 {
        info!("no changes detected");
        return Ok(report);
    }

    let mut job = RenderJob::new(collected.site.clone(), collected.template_dirs.clone());
    if opts.cache {
        // Site and collection config feed every page too, so they join the
        // template set the cache keys on.
        let cache = RenderCache::new(opts.cache_dir.join(RENDER_CACHE_DIR), &collected.config_inputs)?;
        job = job.with_cache(&cache);
    }
    let coordinator =
        ParallelBuildCoordinator::new(opts.workers, opts.isolation.clone()).with_timeout(opts.worker_timeout);
    let summary = coordinator.run(&job, &selection.tasks)?;
    report.written = summary.written;
    report.stats = summary.stats;

    for task in &selection.tasks {
        record(&mut manifest, &task.entry.source, std::slice::from_ref(&task.output));
    }
    for source in &collected.filtered {
        record(&mut manifest, source, &[]);
    }
    manifest.save().map_err(|e| BuildError::io(manifest.path(), e))?;
    inputs.capture(&collected.config_inputs);
    inputs.save().map_err(|e| BuildError::io(inputs.path(), e))?;
    debug!(path = %manifest.path().display(), entries = manifest.len(), inputs = inputs.len(), "manifest saved");

    info!(mode = %report.mode, written = report.written, total = report.total, "build finished");
    Ok(report)
}

/// Manifest and input snapshot for the output dir. Both start empty when
/// the cache is off.
fn load_state(opts: &BuildOptions, output_dir: &Path) -> (BuildManifest, InputSnapshot) {
    let manifest_path = manifest_path_for(&opts.cache_dir, output_dir);
    let inputs_path = inputs_path_for(&opts.cache_dir, output_dir);
    if opts.cache {
        (BuildManifest::load(manifest_path), InputSnapshot::load(inputs_path))
    } else {
        (BuildManifest::empty(manifest_path), InputSnapshot::empty(inputs_path))
    }
}

/// A source that can no longer be hashed stays out of the manifest, so the
/// next build treats it as new.
fn record(manifest: &mut BuildManifest, source: &Path, outputs: &[PathBuf]) {
    if let Err(e) = manifest.record(source, outputs) {
        warn!(path = %source.display(), error = %e, "cannot record source in manifest");
    }
}

/// Delete stale outputs and their directory if it became empty.
/// Returns how many files were actually removed.
fn remove_stale(paths: &[PathBuf]) -> usize {
    let mut removed = 0;
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed stale output");
                removed += 1;
                if let Some(parent) = path.parent() {
                    // Fails harmlessly when the directory still has files.
                    let _ = fs::remove_dir(parent);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "cannot remove stale output"),
        }
    }
    removed
}

/// What `build` would write and delete, touching nothing.
pub fn plan(opts: &BuildOptions) -> Result<BuildPlan, BuildError> {
    let (content_dir, output_dir) = resolve_dirs(opts)?;
    let collected = collect(&content_dir, &output_dir, opts)?;
    let (manifest, inputs) = load_state(opts, &output_dir);
    let selection = select(&collected, &manifest, &inputs, opts);

    let mut writes: Vec<PathBuf> = selection.tasks.into_iter().map(|t| t.output).collect();
    writes.sort();
    let mut removes = if opts.cache {
        let mut stale = manifest.stale_outputs(&collected.current_sources());
        stale.extend(selection.unpublished);
        stale.retain(|p| p.exists());
        stale
    } else {
        Vec::new()
    };
    removes.sort();
    Ok(BuildPlan {
        mode: selection.mode,
        writes,
        removes,
    })
}

/// Remove the output directory and the cache directory. Returns the
/// directories that existed and were removed.
pub fn clean(output_dir: &Path, cache_dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let mut removed = Vec::new();
    for dir in [output_dir, cache_dir] {
        match fs::remove_dir_all(dir) {
            Ok(()) => removed.push(dir.to_path_buf()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(BuildError::io(dir, e)),
        }
    }
    Ok(removed)
}
