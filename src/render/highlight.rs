//! Syntax highlighting of fenced code blocks.
//!
//! Runs after Markdown. Every `<pre><code class="language-X">` block whose
//! language syntect knows is replaced by syntect's inline-styled HTML.
//! Blocks without a language, or with one syntect does not recognize, are
//! left as they are so a client-side highlighter can still pick them up.
//!
//! Loading the bundled syntaxes is the expensive part, so it happens once
//! per processor, on the first block that needs it.

use super::processor::ContentProcessor;
use crate::content::ContentEntry;
use std::sync::OnceLock;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;
use tracing::warn;

pub const DEFAULT_THEME: &str = "InspiredGitHub";

const OPEN: &str = "<pre><code class=\"language-";
const CLOSE: &str = "</code></pre>";

struct Assets {
    syntaxes: SyntaxSet,
    theme: Theme,
}

pub struct SyntaxHighlightProcessor {
    theme_name: String,
    assets: OnceLock<Assets>,
}

impl SyntaxHighlightProcessor {
    pub fn new() -> Self {
        Self::with_theme(DEFAULT_THEME)
    }

    /// Use one of syntect's bundled themes. Unknown names fall back to
    /// [`DEFAULT_THEME`].
    pub fn with_theme(name: impl Into<String>) -> Self {
        Self {
            theme_name: name.into(),
            assets: OnceLock::new(),
        }
    }

    fn assets(&self) -> &Assets {
        self.assets.get_or_init(|| {
            let mut themes = ThemeSet::load_defaults().themes;
            let theme = match themes.remove(&self.theme_name) {
                Some(theme) => theme,
                None => {
                    warn!(theme = %self.theme_name, "unknown highlight theme, using {DEFAULT_THEME}");
                    themes.remove(DEFAULT_THEME).unwrap_or_default()
                }
            };
            Assets {
                syntaxes: SyntaxSet::load_defaults_newlines(),
                theme,
            }
        })
    }

    /// Highlighted HTML for one block, or `None` to keep the original.
    fn highlight(&self, language: &str, escaped: &str, entry: &ContentEntry) -> Option<String> {
        let assets = self.assets();
        let syntax = assets.syntaxes.find_syntax_by_token(language)?;
        match highlighted_html_for_string(&unescape(escaped), &assets.syntaxes, syntax, &assets.theme) {
            Ok(html) => Some(html),
            Err(e) => {
                warn!(path = %entry.source.display(), language, error = %e, "highlighting failed");
                None
            }
        }
    }
}

impl Default for SyntaxHighlightProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentProcessor for SyntaxHighlightProcessor {
    fn name(&self) -> &str {
        "syntax-highlight"
    }

    fn process(&self, content: String, entry: &ContentEntry) -> String {
        if !content.contains(OPEN) {
            return content;
        }
        let mut out = String::with_capacity(content.len() * 2);
        let mut rest = content.as_str();
        while let Some(start) = rest.find(OPEN) {
            let after = &rest[start + OPEN.len()..];
            let block = after.split_once("\">").and_then(|(language, tail)| {
                let code_len = tail.find(CLOSE)?;
                let consumed = start + OPEN.len() + language.len() + 2 + code_len + CLOSE.len();
                Some((language, &tail[..code_len], consumed))
            });
            let Some((language, code, consumed)) = block else {
                break;
            };
            out.push_str(&rest[..start]);
            match self.highlight(language, code, entry) {
                Some(html) => out.push_str(&html),
                None => out.push_str(&rest[start..consumed]),
            }
            rest = &rest[consumed..];
        }
        out.push_str(rest);
        out
    }
}

/// Undo the escaping pulldown-cmark applies to code block text.
fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
