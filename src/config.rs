//! Build configuration module.
//!
//! Handles loading, validating, and merging `pressroom.toml`. The file is
//! optional and lives in the project root (the directory `pressroom` runs
//! in). Stock defaults are the base layer; the user file is merged on top;
//! command-line flags override both.
//!
//! This file configures the *build*. What the site says about itself (title,
//! base URL, collections) lives in the content tree as YAML; see
//! [`crate::content::site`].
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! content_dir = "content"
//! output_dir = "output"
//!
//! [build]
//! workers = 1                 # 0 = one per CPU core
//! cache = true                # render cache + incremental builds
//! drafts = false              # include draft entries
//! future = false              # include future-dated entries
//! worker_timeout_secs = 600   # 0 = wait forever
//! cache_dir = ".pressroom-cache"
//! isolation = "process"       # or "thread"
//!
//! [theme]
//! dirs = []                   # searched after content/templates
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse. Override just the values you want:
//!
//! ```toml
//! [build]
//! workers = 0
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE: &str = "pressroom.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Build configuration loaded from `pressroom.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PressroomConfig {
    /// Directory holding `config.yaml`, collections and pages.
    pub content_dir: String,
    /// Directory the HTML is written to.
    pub output_dir: String,
    pub build: BuildConfig,
    pub theme: ThemeConfig,
}

impl Default for PressroomConfig {
    fn default() -> Self {
        Self {
            content_dir: "content".to_string(),
            output_dir: "output".to_string(),
            build: BuildConfig::default(),
            theme: ThemeConfig::default(),
        }
    }
}

impl PressroomConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.content_dir.trim().is_empty() {
            return Err(ConfigError::Validation("content_dir must not be empty".into()));
        }
        if self.output_dir.trim().is_empty() {
            return Err(ConfigError::Validation("output_dir must not be empty".into()));
        }
        if Path::new(&self.content_dir) == Path::new(&self.output_dir) {
            return Err(ConfigError::Validation(
                "output_dir must differ from content_dir".into(),
            ));
        }
        if self.build.cache_dir.trim().is_empty() {
            return Err(ConfigError::Validation("build.cache_dir must not be empty".into()));
        }
        Ok(())
    }
}

/// How worker processes are isolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    /// Re-run the `pressroom` binary per worker.
    Process,
    /// Threads inside the build process.
    Thread,
}

/// Rendering and caching settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Number of workers. 0 means one per CPU core.
    pub workers: usize,
    pub cache: bool,
    pub drafts: bool,
    pub future: bool,
    /// Seconds before a worker process is killed. 0 disables the limit.
    pub worker_timeout_secs: u64,
    /// Holds the render cache and build manifests.
    pub cache_dir: String,
    pub isolation: IsolationMode,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            cache: true,
            drafts: false,
            future: false,
            worker_timeout_secs: 600,
            cache_dir: ".pressroom-cache".to_string(),
            isolation: IsolationMode::Process,
        }
    }
}

impl BuildConfig {
    pub fn worker_timeout(&self) -> Option<Duration> {
        (self.worker_timeout_secs > 0).then(|| Duration::from_secs(self.worker_timeout_secs))
    }
}

/// Resolve the effective worker count.
///
/// - `0` → use all available cores
/// - `n` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_workers(workers: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    if workers == 0 { cores } else { workers.min(cores) }
}

/// Theme lookup settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThemeConfig {
    /// Template directories, highest priority first. `content/templates`
    /// always comes before these.
    pub dirs: Vec<String>,
}

impl ThemeConfig {
    pub fn dir_paths(&self) -> Vec<PathBuf> {
        self.dirs.iter().map(PathBuf::from).collect()
    }
}

/// Built-in defaults as a TOML table, the bottom layer every user file is
/// merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(PressroomConfig::default())?)
}

/// Lay `overlay` over `base`. Tables merge per key, recursing into nested
/// tables; any other overlay value wins outright.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    let (mut merged, top) = match (base, overlay) {
        (toml::Value::Table(merged), toml::Value::Table(top)) => (merged, top),
        (_, overlay) => return overlay,
    };
    for (key, value) in top {
        let value = match merged.remove(&key) {
            Some(below) => merge_toml(below, value),
            None => value,
        };
        merged.insert(key, value);
    }
    toml::Value::Table(merged)
}

/// Raw contents of `<dir>/pressroom.toml`, or `None` when there is no such
/// file. Malformed TOML is an error.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let path = dir.join(CONFIG_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path)?;
    Ok(Some(toml::from_str(&text)?))
}

/// Deserialize `base` with `overlay` applied and run [`PressroomConfig::validate`].
pub fn resolve_config(base: toml::Value, overlay: Option<toml::Value>) -> Result<PressroomConfig, ConfigError> {
    let value = match overlay {
        Some(top) => merge_toml(base, top),
        None => base,
    };
    let config: PressroomConfig = value.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Stock defaults overlaid with `<root>/pressroom.toml`, if present.
pub fn load_config(root: &Path) -> Result<PressroomConfig, ConfigError> {
    resolve_config(stock_defaults_value()?, load_raw_config(root)?)
}

/// Returns a fully-commented stock `pressroom.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Pressroom Configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Command-line flags override values set here.

# Directory holding config.yaml, collections (directories with a
# _collection.yaml) and standalone pages (top-level *.md files).
content_dir = "content"

# Directory the generated HTML is written to.
output_dir = "output"

# ---------------------------------------------------------------------------
# Build
# ---------------------------------------------------------------------------
[build]
# Parallel render workers. 0 = one per CPU core. Values above the core
# count are clamped down.
workers = 1

# Render cache and incremental builds. When false, the output directory is
# wiped and every page is rendered from scratch.
cache = true

# Include entries marked `draft: true`.
drafts = false

# Include entries dated in the future.
future = false

# Seconds before a worker process is killed and the build fails.
# 0 = no limit.
worker_timeout_secs = 600

# Render cache and build manifests live here.
cache_dir = ".pressroom-cache"

# "process": each worker is a separate pressroom process.
# "thread":  workers are threads in the build process.
isolation = "process"

# ---------------------------------------------------------------------------
# Theme
# ---------------------------------------------------------------------------
[theme]
# Template directories searched for <layout>.html, highest priority first.
# <content_dir>/templates, when present, is always searched before these.
dirs = []
"##
}
