//! Build orchestration: turning parsed content into written pages.
//!
//! | Module | Role |
//! |--------|------|
//! | [`pipeline`] | One `build` invocation: manifest diffing, task collection, bookkeeping |
//! | [`coordinator`] | Splits tasks across workers and waits for them |
//! | [`worker`] | What a worker does with its share, in a thread or a child process |

pub mod coordinator;
pub mod pipeline;
pub mod worker;

pub use coordinator::{Isolation, ParallelBuildCoordinator, RunSummary, partition};
pub use pipeline::{BuildMode, BuildOptions, BuildPlan, BuildReport, build, clean, plan};
pub use worker::RenderJob;

use crate::cache::CacheError;
use crate::content::{ContentEntry, ContentError};
use crate::render::RenderError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// One entry and the file it renders to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildTask {
    pub entry: ContentEntry,
    pub output: PathBuf,
}

impl BuildTask {
    pub fn new(entry: ContentEntry, output: PathBuf) -> Self {
        Self { entry, output }
    }
}

/// A worker that did not finish cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub index: usize,
    /// Process exit code; `None` for thread workers or signal deaths.
    pub code: Option<i32>,
    pub timed_out: bool,
    /// Tasks known to have failed. Zero when the worker died before reporting.
    pub failed_tasks: usize,
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker {}", self.index)?;
        if self.timed_out {
            return write!(f, " timed out");
        }
        match self.code {
            Some(code) => write!(f, " exited with code {code}")?,
            None if self.failed_tasks == 0 => write!(f, " was terminated")?,
            None => {}
        }
        if self.failed_tasks > 0 {
            write!(f, " ({} task(s) failed)", self.failed_tasks)?;
        }
        Ok(())
    }
}

/// A task that failed inside a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub source: PathBuf,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("content directory not found: {0}")]
    ContentDirNotFound(PathBuf),
    #[error("output directory {output} would overwrite {protected}")]
    UnsafeOutputDir { output: PathBuf, protected: PathBuf },
    #[error("parse: {first} and {second} both render to {output}")]
    DuplicateOutput {
        output: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("parse: {0}")]
    Content(#[from] ContentError),
    #[error("cache: {0}")]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("write: cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("render: {} task(s) failed, first: {}", .failures.len(), first_failure(.failures))]
    TasksFailed { failures: Vec<TaskFailure> },
    #[error("render: one or more workers failed: {}", join_failures(.failures))]
    WorkersFailed { failures: Vec<WorkerFailure> },
    #[error("cannot start worker process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("cannot build worker thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("worker job encoding: {0}")]
    Job(#[from] serde_json::Error),
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn first_failure(failures: &[TaskFailure]) -> String {
    failures
        .first()
        .map(|f| format!("{}: {}", f.source.display(), f.message))
        .unwrap_or_default()
}

fn join_failures(failures: &[WorkerFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_failure_messages() {
        let exited = WorkerFailure {
            index: 2,
            code: Some(1),
            timed_out: false,
            failed_tasks: 0,
        };
        assert_eq!(exited.to_string(), "worker 2 exited with code 1");

        let timed_out = WorkerFailure {
            index: 0,
            code: None,
            timed_out: true,
            failed_tasks: 0,
        };
        assert_eq!(timed_out.to_string(), "worker 0 timed out");

        let thread = WorkerFailure {
            index: 1,
            code: None,
            timed_out: false,
            failed_tasks: 3,
        };
        assert_eq!(thread.to_string(), "worker 1 (3 task(s) failed)");
    }

    #[test]
    fn workers_failed_lists_every_worker() {
        let err = BuildError::WorkersFailed {
            failures: vec![
                WorkerFailure {
                    index: 0,
                    code: Some(1),
                    timed_out: false,
                    failed_tasks: 0,
                },
                WorkerFailure {
                    index: 3,
                    code: None,
                    timed_out: true,
                    failed_tasks: 0,
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "render: one or more workers failed: worker 0 exited with code 1, worker 3 timed out"
        );
    }

    #[test]
    fn tasks_failed_names_first_source() {
        let err = BuildError::TasksFailed {
            failures: vec![TaskFailure {
                source: PathBuf::from("/c/a.md"),
                message: "boom".into(),
            }],
        };
        assert_eq!(err.to_string(), "render: 1 task(s) failed, first: /c/a.md: boom");
    }
}
