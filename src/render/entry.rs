//! Rendering one entry to a complete HTML page.
//!
//! ```text
//! cache hit  → cached HTML, nothing else runs
//! cache miss → body() → ProcessorPipeline → layout template → cache.set
//! ```
//!
//! The layout is the entry's `layout` front matter or `entry`. When no theme
//! directory provides it, a built-in Maud layout is used so a content tree
//! without any templates still builds.

use super::processor::ProcessorPipeline;
use super::template::TemplateSet;
use super::RenderError;
use crate::cache::{CacheStats, RenderCache};
use crate::content::{ContentEntry, SiteConfig};
use chrono::NaiveDateTime;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::collections::HashMap;
use std::fmt::Write;
use tracing::{debug, warn};

/// Layout used when an entry names none.
pub const DEFAULT_LAYOUT: &str = "entry";

pub struct EntryRenderer {
    pipeline: ProcessorPipeline,
    templates: TemplateSet,
    cache: Option<RenderCache>,
    stats: CacheStats,
}

impl EntryRenderer {
    pub fn new(pipeline: ProcessorPipeline, templates: TemplateSet) -> Self {
        Self {
            pipeline,
            templates,
            cache: None,
            stats: CacheStats::default(),
        }
    }

    pub fn with_cache(mut self, cache: RenderCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&RenderCache> {
        self.cache.as_ref()
    }

    /// Hits and misses so far. Without a cache every render is a miss.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Render `entry` to HTML, consulting the cache first.
    pub fn render(&mut self, site: &SiteConfig, entry: &ContentEntry) -> Result<String, RenderError> {
        let source = entry.source_path();
        if let Some(cache) = &self.cache
            && let Some(html) = cache.get(source)
        {
            debug!(path = %source.display(), "cache hit");
            self.stats.hit();
            return Ok(html);
        }

        let html = self.render_uncached(site, entry)?;
        self.stats.miss();

        if let Some(cache) = &self.cache
            && let Err(e) = cache.set(source, &html)
        {
            warn!(path = %source.display(), error = %e, "failed to write render cache entry");
        }
        Ok(html)
    }

    fn render_uncached(&mut self, site: &SiteConfig, entry: &ContentEntry) -> Result<String, RenderError> {
        let body = entry.body().map_err(|source| RenderError::Body {
            path: entry.source.clone(),
            source,
        })?;
        let content = self.pipeline.process(body, entry);

        let layout = if entry.layout.is_empty() {
            DEFAULT_LAYOUT
        } else {
            entry.layout.as_str()
        };
        match self.templates.get(layout)? {
            Some(template) => Ok(template.render(&template_vars(site, entry, content))),
            None => {
                if layout != DEFAULT_LAYOUT {
                    warn!(layout, path = %entry.source.display(), "layout not found, using built-in");
                }
                Ok(builtin_layout(site, entry, &content).into_string())
            }
        }
    }
}

/// Variables available to templates. Everything except `content` is
/// HTML-escaped.
fn template_vars<'a>(site: &SiteConfig, entry: &ContentEntry, content: String) -> HashMap<&'a str, String> {
    let mut vars = HashMap::new();
    let escaped = |s: &str| html! { (s) }.into_string();
    vars.insert("title", escaped(&entry.title));
    vars.insert("slug", escaped(&entry.slug));
    vars.insert("collection", escaped(&entry.collection));
    vars.insert("summary", escaped(&entry.summary));
    vars.insert("tags", escaped(&entry.tags.join(", ")));
    vars.insert("date", escaped(&entry.date.map(|d| format_date(d, &site.date_format)).unwrap_or_default()));
    vars.insert(
        "date_iso",
        entry
            .date
            .map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string())
            .unwrap_or_default(),
    );
    vars.insert("site_title", escaped(&site.title));
    vars.insert("site_description", escaped(&site.description));
    vars.insert("base_url", escaped(&site.base_url));
    vars.insert("language", escaped(&site.language));
    vars.insert("content", content);
    vars
}

/// Format with the site's pattern, falling back to ISO when the pattern is
/// not a valid strftime string.
fn format_date(date: NaiveDateTime, pattern: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", date.format(pattern)).is_err() {
        return date.format("%Y-%m-%d").to_string();
    }
    out
}

fn builtin_layout(site: &SiteConfig, entry: &ContentEntry, content: &str) -> Markup {
    let page_title = if site.title.is_empty() {
        entry.title.clone()
    } else {
        format!("{} | {}", entry.title, site.title)
    };
    html! {
        (DOCTYPE)
        html lang=(site.language) {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (page_title) }
                @if !site.description.is_empty() {
                    meta name="description" content=(site.description);
                }
            }
            body {
                article {
                    header {
                        h1 { (entry.title) }
                        @if let Some(date) = entry.date {
                            time datetime=(date.format("%Y-%m-%d").to_string()) {
                                (format_date(date, &site.date_format))
                            }
                        }
                    }
                    (PreEscaped(content))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::parse_entry;
    use crate::render::template::TemplateResolver;
    use crate::test_helpers::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn renderer(template_dir: &Path) -> EntryRenderer {
        EntryRenderer::new(
            ProcessorPipeline::standard(),
            TemplateSet::new(TemplateResolver::new(vec![template_dir.to_path_buf()])),
        )
    }

    #[test]
    fn renders_through_template() {
        let tmp = TempDir::new().unwrap();
        let templates = tmp.path().join("t");
        write_template(&templates, "entry.html", "<title>{{ title }}</title>{{ content }}");
        let path = write_entry(tmp.path(), "post.md", "A & B", "Hello *there*");

        let entry = parse_entry(&path, "blog").unwrap();
        let html = renderer(&templates).render(&SiteConfig::default(), &entry).unwrap();
        assert_eq!(html, "<title>A &amp; B</title><p>Hello <em>there</em></p>\n");
    }

    #[test]
    fn entry_layout_selects_template() {
        let tmp = TempDir::new().unwrap();
        let templates = tmp.path().join("t");
        write_template(&templates, "entry.html", "entry");
        write_template(&templates, "page.html", "page:{{ content }}");
        let path = tmp.path().join("p.md");
        fs::write(&path, "---\ntitle: P\nlayout: page\n---\nx\n").unwrap();

        let entry = parse_entry(&path, "").unwrap();
        let html = renderer(&templates).render(&SiteConfig::default(), &entry).unwrap();
        assert_eq!(html, "page:<p>x</p>\n");
    }

    #[test]
    fn builtin_layout_without_templates() {
        let tmp = TempDir::new().unwrap();
        let path = write_entry(tmp.path(), "post.md", "Fallback", "Text");
        let entry = parse_entry(&path, "").unwrap();

        let site = SiteConfig {
            title: "Site".into(),
            ..SiteConfig::default()
        };
        let html = renderer(&tmp.path().join("none")).render(&site, &entry).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Fallback | Site</title>"));
        assert!(html.contains("<p>Text</p>"));
    }

    #[test]
    fn unreadable_body_fails_entry() {
        let tmp = TempDir::new().unwrap();
        let path = write_entry(tmp.path(), "post.md", "Gone", "Text");
        let entry = parse_entry(&path, "").unwrap();
        fs::remove_file(&path).unwrap();

        let err = renderer(tmp.path()).render(&SiteConfig::default(), &entry).unwrap_err();
        assert!(matches!(err, RenderError::Body { .. }));
    }

    #[test]
    fn invalid_date_format_falls_back_to_iso() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(format_date(date, "%Y/%m"), "2024/03");
        assert_eq!(format_date(date, "%Q"), "2024-03-09");
    }

    // =========================================================================
    // Cache interaction
    // =========================================================================

    #[test]
    fn second_render_is_a_cache_hit() {
        let tmp = TempDir::new().unwrap();
        let templates = tmp.path().join("t");
        let tpl = write_template(&templates, "entry.html", "{{ content }}");
        let path = write_entry(tmp.path(), "post.md", "T", "Body");
        let entry = parse_entry(&path, "").unwrap();
        let cache = RenderCache::new(tmp.path().join("cache"), &[tpl]).unwrap();

        let mut r = renderer(&templates).with_cache(cache);
        let first = r.render(&SiteConfig::default(), &entry).unwrap();
        let second = r.render(&SiteConfig::default(), &entry).unwrap();
        assert_eq!(first, second);
        assert_eq!(r.stats().hits, 1);
        assert_eq!(r.stats().misses, 1);
    }

    #[test]
    fn cache_hit_skips_pipeline_and_body() {
        let tmp = TempDir::new().unwrap();
        let path = write_entry(tmp.path(), "post.md", "T", "Body");
        let entry = parse_entry(&path, "").unwrap();
        let cache = RenderCache::new(tmp.path().join("cache"), &[]).unwrap();
        cache.set(&path, "<p>from cache</p>").unwrap();

        let mut r = renderer(tmp.path()).with_cache(cache);
        let html = r.render(&SiteConfig::default(), &entry).unwrap();
        assert_eq!(html, "<p>from cache</p>");
        assert_eq!(r.stats().misses, 0);
    }

    #[test]
    fn unwritable_cache_still_returns_html() {
        let tmp = TempDir::new().unwrap();
        let path = write_entry(tmp.path(), "post.md", "T", "Body");
        let entry = parse_entry(&path, "").unwrap();
        let cache_dir = tmp.path().join("cache");
        let cache = RenderCache::new(&cache_dir, &[]).unwrap();
        fs::remove_dir_all(&cache_dir).unwrap();
        fs::write(&cache_dir, "not a directory").unwrap();

        let mut r = renderer(tmp.path()).with_cache(cache);
        let html = r.render(&SiteConfig::default(), &entry).unwrap();
        assert!(html.contains("<p>Body</p>"));
    }
}
