//! Page templates.
//!
//! Templates are plain HTML files with `{{ name }}` placeholders, looked up
//! by name across an ordered list of theme directories:
//!
//! ```text
//! content/templates/entry.html   ← local theme, searched first
//! themes/base/entry.html         ← configured theme dirs, in order
//! ```
//!
//! Placeholder values are inserted verbatim; the caller escapes them (see
//! [`super::entry`]). Unknown placeholders render as nothing.
//!
//! A [`TemplateSet`] owns the parsed templates of one renderer. Each name is
//! resolved and parsed at most once for the life of the set.

use super::RenderError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

pub const TEMPLATE_EXT: &str = "html";

/// Finds template files across theme directories in priority order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateResolver {
    dirs: Vec<PathBuf>,
}

impl TemplateResolver {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// First `<dir>/<name>.html` that exists. Names come from front matter,
    /// so anything that is not a single plain file name resolves to nothing.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if !is_plain_name(name) {
            warn!(layout = name, "layout name is not a plain file name");
            return None;
        }
        self.dirs
            .iter()
            .map(|dir| dir.join(format!("{name}.{TEMPLATE_EXT}")))
            .find(|path| path.is_file())
    }

    /// Every `*.html` file under every directory, sorted and deduplicated.
    /// This is the template set the render cache fingerprints.
    pub fn template_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .dirs
            .iter()
            .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == TEMPLATE_EXT))
            .collect();
        files.sort();
        files.dedup();
        files
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\']) && !name.contains(':')
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Var(String),
}

/// A parsed `{{ var }}` template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut rest = source;
        while let Some(open) = rest.find("{{") {
            let Some(close) = rest[open + 2..].find("}}") else {
                break;
            };
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let name = rest[open + 2..open + 2 + close].trim();
            segments.push(Segment::Var(name.to_string()));
            rest = &rest[open + 2 + close + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Self { segments }
    }

    pub fn load(path: &Path) -> Result<Self, RenderError> {
        let source = std::fs::read_to_string(path).map_err(|source| RenderError::Template {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&source))
    }

    /// Placeholder names in order of appearance.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Var(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn render(&self, vars: &HashMap<&str, String>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Var(name) => {
                    if let Some(value) = vars.get(name.as_str()) {
                        out.push_str(value);
                    }
                }
            }
        }
        out
    }
}

/// Templates of one renderer, parsed on first use.
#[derive(Debug, Default)]
pub struct TemplateSet {
    resolver: TemplateResolver,
    loaded: HashMap<String, Option<Template>>,
}

impl TemplateSet {
    pub fn new(resolver: TemplateResolver) -> Self {
        Self {
            resolver,
            loaded: HashMap::new(),
        }
    }

    pub fn resolver(&self) -> &TemplateResolver {
        &self.resolver
    }

    /// Template named `name`, or `None` when no theme dir provides it.
    pub fn get(&mut self, name: &str) -> Result<Option<&Template>, RenderError> {
        if !self.loaded.contains_key(name) {
            let template = match self.resolver.resolve(name) {
                Some(path) => {
                    tracing::debug!(template = name, path = %path.display(), "loading template");
                    Some(Template::load(&path)?)
                }
                None => None,
            };
            self.loaded.insert(name.to_string(), template);
        }
        Ok(self.loaded.get(name).and_then(Option::as_ref))
    }

    /// Number of names looked up so far, found or not.
    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }
}
