//! Entry rendering: body processing, templating and the render cache.
//!
//! | Module | Role |
//! |--------|------|
//! | [`processor`] | Body transformations (Markdown, heading anchors) |
//! | [`highlight`] | syntect highlighting of fenced code blocks |
//! | [`template`] | Theme directory lookup and `{{ var }}` templates |
//! | [`entry`] | [`EntryRenderer`], which ties the two to the cache |

pub mod entry;
pub mod highlight;
pub mod processor;
pub mod template;

pub use entry::EntryRenderer;
pub use highlight::SyntaxHighlightProcessor;
pub use processor::{ContentProcessor, ProcessorPipeline};
pub use template::{Template, TemplateResolver, TemplateSet};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("render: cannot read body of {path}: {source}")]
    Body {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("render: cannot load template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
