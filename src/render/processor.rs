//! Content processors: the body transformations run before templating.
//!
//! A [`ProcessorPipeline`] applies its processors in order, each taking the
//! previous output. The default pipeline converts Markdown to HTML,
//! highlights fenced code (see [`super::highlight`]), and then gives every
//! heading an `id` so sections can be linked.

use super::highlight::SyntaxHighlightProcessor;
use crate::content::ContentEntry;
use pulldown_cmark::{Options, Parser, html as md_html};
use std::collections::HashMap;

/// One step of body processing.
///
/// Processors are shared across threads by the threaded build, hence the
/// `Send + Sync` bound.
pub trait ContentProcessor: Send + Sync {
    fn name(&self) -> &str;
    fn process(&self, content: String, entry: &ContentEntry) -> String;
}

/// Ordered list of processors.
pub struct ProcessorPipeline {
    processors: Vec<Box<dyn ContentProcessor>>,
}

impl ProcessorPipeline {
    pub fn new() -> Self {
        Self {
            processors: Vec::new(),
        }
    }

    /// Markdown, syntax highlighting, heading anchors.
    pub fn standard() -> Self {
        Self::new()
            .with(MarkdownProcessor)
            .with(SyntaxHighlightProcessor::new())
            .with(HeadingAnchorProcessor)
    }

    pub fn with(mut self, processor: impl ContentProcessor + 'static) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    pub fn process(&self, content: String, entry: &ContentEntry) -> String {
        self.processors
            .iter()
            .fold(content, |acc, p| p.process(acc, entry))
    }
}

impl Default for ProcessorPipeline {
    fn default() -> Self {
        Self::standard()
    }
}

/// CommonMark plus tables, footnotes, strikethrough and task lists.
pub struct MarkdownProcessor;

impl ContentProcessor for MarkdownProcessor {
    fn name(&self) -> &str {
        "markdown"
    }

    fn process(&self, content: String, _entry: &ContentEntry) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        let parser = Parser::new_ext(&content, options);
        let mut html = String::with_capacity(content.len() * 3 / 2);
        md_html::push_html(&mut html, parser);
        html
    }
}

/// Adds `id="..."` to `<h1>`..`<h6>` tags that have no attributes.
///
/// Ids are slugs of the heading text; repeats get `-1`, `-2`, ... suffixes.
pub struct HeadingAnchorProcessor;

impl ContentProcessor for HeadingAnchorProcessor {
    fn name(&self) -> &str {
        "heading-anchors"
    }

    fn process(&self, content: String, _entry: &ContentEntry) -> String {
        let mut out = String::with_capacity(content.len() + 64);
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut rest = content.as_str();

        while let Some(start) = rest.find("<h") {
            let level = rest.as_bytes().get(start + 2).copied();
            let is_open = matches!(level, Some(b'1'..=b'6'))
                && rest.as_bytes().get(start + 3) == Some(&b'>');
            if !is_open {
                out.push_str(&rest[..start + 2]);
                rest = &rest[start + 2..];
                continue;
            }
            let level = (level.unwrap_or(b'1') - b'0') as usize;
            let close = format!("</h{level}>");
            let inner_start = start + 4;
            let Some(inner_len) = rest[inner_start..].find(&close) else {
                break;
            };
            let inner = &rest[inner_start..inner_start + inner_len];

            let base = slugify(&strip_tags(inner));
            let id = match seen.get_mut(&base) {
                Some(n) => {
                    *n += 1;
                    format!("{base}-{n}")
                }
                None => {
                    seen.insert(base.clone(), 0);
                    base
                }
            };

            out.push_str(&rest[..start]);
            if id.is_empty() {
                out.push_str(&format!("<h{level}>"));
            } else {
                out.push_str(&format!("<h{level} id=\"{id}\">"));
            }
            out.push_str(inner);
            out.push_str(&close);
            rest = &rest[inner_start + inner_len + close.len()..];
        }
        out.push_str(rest);
        out
    }
}

fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text
}

/// Lowercase alphanumerics joined by single dashes. Entities like `&amp;`
/// are dropped.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '&' {
            // skip the entity up to ';'
            for e in chars.by_ref() {
                if e == ';' {
                    break;
                }
            }
            push_dash(&mut slug);
        } else if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else {
            push_dash(&mut slug);
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn push_dash(slug: &mut String) {
    if !slug.is_empty() && !slug.ends_with('-') {
        slug.push('-');
    }
}
