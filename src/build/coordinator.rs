//! Parallel task distribution.
//!
//! Tasks are dealt round-robin: with 3 workers, worker 0 gets tasks 0, 3,
//! 6, ..., worker 1 gets 1, 4, 7, ... Worker shares therefore differ by at
//! most one task. Task outputs are unique (the pipeline refuses two entries
//! with the same permalink), so no file is written by two workers.
//!
//! Each worker is either a child process (the `pressroom` binary re-run
//! with a hidden subcommand, so a crash or leak in one share cannot take the
//! build down) or a thread in a dedicated rayon pool. Either way the worker
//! builds its own renderer; nothing mutable is shared.
//!
//! The coordinator never touches the build manifest. Partial outputs of a
//! failed run stay on disk; the next build re-renders them because the
//! manifest was not updated.

use super::worker::{RenderJob, WORKER_SUBCOMMAND, WorkerJob, WorkerReport, render_share};
use super::{BuildError, BuildTask, WorkerFailure};
use crate::cache::CacheStats;
use rayon::prelude::*;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How workers are isolated from each other and from the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Isolation {
    /// Each worker is `<program> render-worker`.
    Process { program: PathBuf },
    /// Each worker is a thread in a pool sized to the worker count.
    Threads,
}

/// Result of a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub written: usize,
    /// Cache counters summed over workers that reported them.
    pub stats: CacheStats,
}

/// Round-robin partition of `len` task indices over at most `workers`
/// shares. Never returns an empty share; `len == 0` gives no shares.
pub fn partition(len: usize, workers: usize) -> Vec<Vec<usize>> {
    let shares = workers.max(1).min(len);
    let mut parts = vec![Vec::with_capacity(len / shares.max(1) + 1); shares];
    for i in 0..len {
        parts[i % shares].push(i);
    }
    parts
}

#[derive(Debug, Clone)]
pub struct ParallelBuildCoordinator {
    workers: usize,
    isolation: Isolation,
    timeout: Option<Duration>,
}

impl ParallelBuildCoordinator {
    pub fn new(workers: usize, isolation: Isolation) -> Self {
        Self {
            workers,
            isolation,
            timeout: None,
        }
    }

    /// Kill and fail any worker process still running after `timeout`.
    /// Thread workers cannot be interrupted and ignore it.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Render and write every task. Returns the number written.
    pub fn run(&self, job: &RenderJob, tasks: &[BuildTask]) -> Result<RunSummary, BuildError> {
        if tasks.is_empty() {
            return Ok(RunSummary::default());
        }
        if self.workers <= 1 {
            debug!(tasks = tasks.len(), "rendering sequentially");
            let report = render_share(job, tasks)?;
            if !report.succeeded() {
                return Err(BuildError::TasksFailed {
                    failures: report.failures,
                });
            }
            return Ok(RunSummary {
                written: report.written,
                stats: report.stats(),
            });
        }

        let parts = partition(tasks.len(), self.workers);
        info!(workers = parts.len(), tasks = tasks.len(), "starting workers");
        match &self.isolation {
            Isolation::Threads => run_threads(job, tasks, &parts),
            Isolation::Process { program } => self.run_processes(program, job, tasks, &parts),
        }
    }

    fn run_processes(
        &self,
        program: &Path,
        job: &RenderJob,
        tasks: &[BuildTask],
        parts: &[Vec<usize>],
    ) -> Result<RunSummary, BuildError> {
        let mut running: Vec<Running> = Vec::with_capacity(parts.len());
        for (index, part) in parts.iter().enumerate() {
            let payload = serde_json::to_vec(&WorkerJob {
                index,
                job: job.clone(),
                tasks: part.iter().map(|&i| tasks[i].clone()).collect(),
            })?;
            let spawned = Command::new(program)
                .arg(WORKER_SUBCOMMAND)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .spawn();
            let mut child = match spawned {
                Ok(child) => child,
                Err(e) => {
                    kill_all(&mut running);
                    return Err(BuildError::Spawn(e));
                }
            };
            // Dropping stdin after the write signals end of job.
            if let Some(mut stdin) = child.stdin.take()
                && let Err(e) = stdin.write_all(&payload)
            {
                warn!(worker = index, error = %e, "failed to send job to worker");
            }
            // Drained from the start so a large report cannot fill the pipe
            // while we wait for the exit status.
            let report = child.stdout.take().map(|mut stdout| {
                thread::spawn(move || {
                    let mut out = String::new();
                    stdout.read_to_string(&mut out).map(|_| out)
                })
            });
            debug!(worker = index, tasks = part.len(), pid = child.id(), "worker spawned");
            running.push(Running { index, child, report });
        }

        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut summary = RunSummary::default();
        let mut failures = Vec::new();
        for Running { index, mut child, report } in running {
            let (status, timed_out) = match wait_until(&mut child, deadline) {
                Ok(waited) => waited,
                Err(e) => {
                    warn!(worker = index, error = %e, "lost track of worker");
                    (None, false)
                }
            };
            // A killed worker's grandchildren may still hold the pipe open,
            // so only collect the report of a worker that exited on its own.
            let report = if timed_out { None } else { report.and_then(read_report) };
            match status {
                Some(status) if status.success() => {
                    let written = report
                        .as_ref()
                        .map_or(parts[index].len(), |r| r.written);
                    summary.written += written;
                    if let Some(report) = &report {
                        summary.stats.merge(report.stats());
                    }
                    debug!(worker = index, written, "worker finished");
                }
                _ => {
                    let failure = WorkerFailure {
                        index,
                        code: status.and_then(|s| s.code()),
                        timed_out,
                        failed_tasks: report.map_or(0, |r| r.failures.len()),
                    };
                    warn!(worker = index, "{failure}");
                    failures.push(failure);
                }
            }
        }

        if failures.is_empty() {
            Ok(summary)
        } else {
            Err(BuildError::WorkersFailed { failures })
        }
    }
}

fn run_threads(job: &RenderJob, tasks: &[BuildTask], parts: &[Vec<usize>]) -> Result<RunSummary, BuildError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(parts.len())
        .build()?;
    let results: Vec<Result<WorkerReport, BuildError>> = pool.install(|| {
        parts
            .par_iter()
            .map(|part| render_share(job, part.iter().map(|&i| &tasks[i])))
            .collect()
    });

    let mut summary = RunSummary::default();
    let mut failures = Vec::new();
    for (index, result) in results.into_iter().enumerate() {
        let report = result?;
        summary.written += report.written;
        summary.stats.merge(report.stats());
        if !report.succeeded() {
            failures.push(WorkerFailure {
                index,
                code: None,
                timed_out: false,
                failed_tasks: report.failures.len(),
            });
        }
    }
    if failures.is_empty() {
        Ok(summary)
    } else {
        Err(BuildError::WorkersFailed { failures })
    }
}

/// Wait for `child`, killing it once `deadline` passes.
/// Returns the exit status (if any) and whether it was killed for time.
fn wait_until(child: &mut Child, deadline: Option<Instant>) -> std::io::Result<(Option<ExitStatus>, bool)> {
    let Some(deadline) = deadline else {
        return child.wait().map(|s| (Some(s), false));
    };
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((Some(status), false));
        }
        if Instant::now() >= deadline {
            child.kill()?;
            child.wait()?;
            return Ok((None, true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// A spawned worker process and the thread draining its stdout.
struct Running {
    index: usize,
    child: Child,
    report: Option<JoinHandle<std::io::Result<String>>>,
}

/// The worker's one-line JSON report, if it wrote one.
fn read_report(reader: JoinHandle<std::io::Result<String>>) -> Option<WorkerReport> {
    let out = reader.join().ok()?.ok()?;
    serde_json::from_str(out.trim()).ok()
}

fn kill_all(running: &mut Vec<Running>) {
    for worker in running.iter_mut() {
        if let Err(e) = worker.child.kill() {
            debug!(worker = worker.index, error = %e, "kill failed");
        }
        let _ = worker.child.wait();
    }
    running.clear();
}
