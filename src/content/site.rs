//! Site-wide and per-collection YAML configuration.
//!
//! Two kinds of file live in the content tree:
//!
//! - `config.yaml` at the content root, the site settings
//! - `_collection.yaml` inside a directory, which turns that directory into
//!   a collection
//!
//! Missing keys take defaults. Unknown keys are ignored so content authors
//! can keep their own notes in these files.

use super::ContentError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SITE_CONFIG_FILE: &str = "config.yaml";
pub const COLLECTION_CONFIG_FILE: &str = "_collection.yaml";
pub const DEFAULT_COLLECTION_PERMALINK: &str = "/:collection/:slug/";

/// Settings from `config.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub title: String,
    pub description: String,
    #[serde(alias = "baseUrl")]
    pub base_url: String,
    pub language: String,
    /// strftime pattern for displayed dates.
    #[serde(alias = "dateFormat")]
    pub date_format: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "My Site".to_string(),
            description: String::new(),
            base_url: "/".to_string(),
            language: "en".to_string(),
            date_format: "%B %-d, %Y".to_string(),
        }
    }
}

impl SiteConfig {
    /// Load `config.yaml` from `content_dir`. A missing or unreadable file
    /// yields the defaults; so does a file that is not valid YAML.
    pub fn load(content_dir: &Path) -> Self {
        let path = content_dir.join(SITE_CONFIG_FILE);
        let Ok(text) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        if text.trim().is_empty() {
            return Self::default();
        }
        match serde_yaml_ng::from_str(&text) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "invalid site config, using defaults");
                Self::default()
            }
        }
    }
}

/// A directory of entries sharing a permalink pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Directory name.
    pub name: String,
    pub title: String,
    pub description: String,
    /// Pattern with `:collection`, `:slug`, `:year`, `:month` and `:day`.
    pub permalink: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CollectionFile {
    title: Option<String>,
    description: String,
    permalink: Option<String>,
}

impl Collection {
    /// Load `<dir>/_collection.yaml`. The directory name is the collection
    /// name. A malformed file is an error since every entry's URL depends on it.
    pub fn load(dir: &Path) -> Result<Self, ContentError> {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let path = dir.join(COLLECTION_CONFIG_FILE);
        let text = std::fs::read_to_string(&path).map_err(|source| ContentError::Io {
            path: path.clone(),
            source,
        })?;
        let file: CollectionFile = if text.trim().is_empty() {
            CollectionFile::default()
        } else {
            serde_yaml_ng::from_str(&text).map_err(|source| ContentError::Yaml {
                path: path.clone(),
                source,
            })?
        };
        Ok(Self {
            title: file.title.unwrap_or_else(|| name.clone()),
            description: file.description,
            permalink: file
                .permalink
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_COLLECTION_PERMALINK.to_string()),
            name,
        })
    }
}
