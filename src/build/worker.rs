//! Rendering a share of the build tasks.
//!
//! A worker receives a [`RenderJob`] (everything needed to build its own
//! renderer) and a list of tasks, renders each, and writes the output file.
//! A failing task does not stop the worker; it is reported and the rest of
//! the share still renders.
//!
//! In process isolation the job arrives as one JSON [`WorkerJob`] on stdin
//! and a one-line JSON [`WorkerReport`] goes to stdout when done. Logging
//! goes to stderr, which the parent shares.

use super::{BuildError, BuildTask, TaskFailure};
use crate::cache::{CacheStats, RenderCache};
use crate::content::SiteConfig;
use crate::hash::ContentHash;
use crate::render::{EntryRenderer, ProcessorPipeline, TemplateResolver, TemplateSet};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use tracing::{debug, error};

/// Hidden CLI subcommand a worker process runs.
pub const WORKER_SUBCOMMAND: &str = "render-worker";

/// Where workers find the shared render cache. The template-set hash is
/// computed once by the parent so workers never rehash templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSpec {
    pub dir: PathBuf,
    pub template_hash: ContentHash,
}

/// Everything a worker needs besides its tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJob {
    pub site: SiteConfig,
    pub template_dirs: Vec<PathBuf>,
    pub cache: Option<CacheSpec>,
}

impl RenderJob {
    pub fn new(site: SiteConfig, template_dirs: Vec<PathBuf>) -> Self {
        Self {
            site,
            template_dirs,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: &RenderCache) -> Self {
        self.cache = Some(CacheSpec {
            dir: cache.dir().to_path_buf(),
            template_hash: cache.template_hash(),
        });
        self
    }

    /// A fresh renderer with its own template set and cache handle.
    pub fn renderer(&self) -> Result<EntryRenderer, BuildError> {
        let templates = TemplateSet::new(TemplateResolver::new(self.template_dirs.clone()));
        let renderer = EntryRenderer::new(ProcessorPipeline::standard(), templates);
        Ok(match &self.cache {
            Some(spec) => renderer.with_cache(RenderCache::with_template_hash(&spec.dir, spec.template_hash)?),
            None => renderer,
        })
    }
}

/// Payload of one worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerJob {
    pub index: usize,
    pub job: RenderJob,
    pub tasks: Vec<BuildTask>,
}

/// What a worker did with its share.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub written: usize,
    pub hits: u32,
    pub misses: u32,
    pub failures: Vec<TaskFailure>,
}

impl WorkerReport {
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Render and write every task in `tasks`.
pub fn render_share<'a>(
    job: &RenderJob,
    tasks: impl IntoIterator<Item = &'a BuildTask>,
) -> Result<WorkerReport, BuildError> {
    let mut renderer = job.renderer()?;
    let mut report = WorkerReport::default();
    for task in tasks {
        match write_task(&mut renderer, &job.site, task) {
            Ok(()) => report.written += 1,
            Err(e) => {
                error!(path = %task.entry.source.display(), error = %e, "task failed");
                report.failures.push(TaskFailure {
                    source: task.entry.source.clone(),
                    message: e.to_string(),
                });
            }
        }
    }
    let stats = renderer.stats();
    report.hits = stats.hits;
    report.misses = stats.misses;
    Ok(report)
}

fn write_task(renderer: &mut EntryRenderer, site: &SiteConfig, task: &BuildTask) -> Result<(), BuildError> {
    let html = renderer.render(site, &task.entry)?;
    if let Some(parent) = task.output.parent() {
        fs::create_dir_all(parent).map_err(|source| BuildError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(&task.output, html).map_err(|source| BuildError::Write {
        path: task.output.clone(),
        source,
    })?;
    debug!(output = %task.output.display(), "wrote");
    Ok(())
}

/// Body of the `render-worker` subcommand: read a [`WorkerJob`] from
/// `input` and render its tasks.
pub fn run_worker(mut input: impl Read) -> Result<WorkerReport, BuildError> {
    let mut payload = String::new();
    input
        .read_to_string(&mut payload)
        .map_err(|e| BuildError::io("<stdin>", e))?;
    let job: WorkerJob = serde_json::from_str(&payload)?;
    debug!(worker = job.index, tasks = job.tasks.len(), "worker started");
    render_share(&job.job, &job.tasks)
}
