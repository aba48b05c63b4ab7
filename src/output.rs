//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! Build (incremental)
//!     Written: 2 of 14 pages
//!     Cache: 5 cached, 2 rendered (7 total)
//!     Removed: 1 stale output
//!     Skipped: 1 untitled entry
//! ```
//!
//! Nothing to do:
//!
//! ```text
//! No changes detected (14 pages up to date)
//! ```
//!
//! ## Dry run
//!
//! ```text
//! Dry run (full)
//! Write
//!     about/index.html
//!     blog/hello/index.html
//! Remove
//!     blog/old/index.html
//! 2 to write, 1 to remove
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O.

use crate::build::{BuildPlan, BuildReport};
use std::path::{Path, PathBuf};

// ============================================================================
// Helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `1 page` / `2 pages`.
fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

/// Path relative to `root` with forward slashes, or the full path when it
/// lies outside `root`.
fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

// ============================================================================
// build
// ============================================================================

pub fn format_build_report(report: &BuildReport) -> Vec<String> {
    if report.up_to_date() {
        return vec![format!(
            "No changes detected ({} up to date)",
            plural(report.total, "page", "pages")
        )];
    }

    let mut lines = vec![format!("Build ({})", report.mode)];
    lines.push(format!(
        "{}Written: {} of {}",
        indent(1),
        report.written,
        plural(report.total, "page", "pages")
    ));
    if report.stats.total() > 0 {
        lines.push(format!("{}Cache: {}", indent(1), report.stats));
    }
    if report.stale_removed > 0 {
        lines.push(format!(
            "{}Removed: {}",
            indent(1),
            plural(report.stale_removed, "stale output", "stale outputs")
        ));
    }
    if report.skipped > 0 {
        lines.push(format!(
            "{}Skipped: {}",
            indent(1),
            plural(report.skipped, "untitled entry", "untitled entries")
        ));
    }
    if report.filtered > 0 {
        lines.push(format!(
            "{}Unpublished: {}",
            indent(1),
            plural(report.filtered, "draft or future entry", "drafts or future entries")
        ));
    }
    lines
}

pub fn print_build_report(report: &BuildReport) {
    for line in format_build_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// build --dry-run
// ============================================================================

pub fn format_plan(plan: &BuildPlan, output_root: &Path) -> Vec<String> {
    let mut lines = vec![format!("Dry run ({})", plan.mode)];
    if !plan.writes.is_empty() {
        lines.push("Write".to_string());
        for path in &plan.writes {
            lines.push(format!("{}{}", indent(1), display_path(path, output_root)));
        }
    }
    if !plan.removes.is_empty() {
        lines.push("Remove".to_string());
        for path in &plan.removes {
            lines.push(format!("{}{}", indent(1), display_path(path, output_root)));
        }
    }
    lines.push(format!(
        "{} to write, {} to remove",
        plan.writes.len(),
        plan.removes.len()
    ));
    lines
}

pub fn print_plan(plan: &BuildPlan, output_root: &Path) {
    for line in format_plan(plan, output_root) {
        println!("{}", line);
    }
}

// ============================================================================
// clean
// ============================================================================

pub fn format_clean(removed: &[PathBuf]) -> Vec<String> {
    if removed.is_empty() {
        return vec!["Nothing to clean".to_string()];
    }
    removed
        .iter()
        .map(|dir| format!("Removed {}", dir.display()))
        .collect()
}

pub fn print_clean(removed: &[PathBuf]) {
    for line in format_clean(removed) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
