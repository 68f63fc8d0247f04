//! Code extraction from completed chat responses
//!
//! The primary parser reads fenced blocks out of the assistant's text.
//! When it finds nothing, a fallback parser runs after a short delay
//! and scrapes code elements out of the rendered markup instead.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

/// A language-tagged code fragment
#[derive(Debug, Clone, PartialEq)]
pub struct CodeFragment {
    pub language: Option<String>,
    pub text: String,
}

/// Pluggable parser producing code fragments from response text
pub trait CodeBlockParser: Send + Sync {
    fn parse(&self, text: &str) -> Vec<CodeFragment>;
}

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```([A-Za-z0-9_#+.-]*)[ \t]*\r?\n((?s:.*?))```").unwrap()
});

/// Parses markdown fenced code blocks (``` with an optional language tag)
pub struct FencedBlockParser;

impl CodeBlockParser for FencedBlockParser {
    fn parse(&self, text: &str) -> Vec<CodeFragment> {
        FENCED_BLOCK
            .captures_iter(text)
            .map(|caps| {
                let language = caps
                    .get(1)
                    .map(|m| m.as_str())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                CodeFragment {
                    language,
                    text: caps.get(2).map(|m| m.as_str()).unwrap_or("").to_string(),
                }
            })
            .collect()
    }
}

static CODE_ELEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<code[^>]*>(.*?)</code>").unwrap());
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Scrapes `<code>` elements out of rendered markup. Fallback only.
pub struct RenderedCodeParser;

impl CodeBlockParser for RenderedCodeParser {
    fn parse(&self, text: &str) -> Vec<CodeFragment> {
        CODE_ELEMENT
            .captures_iter(text)
            .filter_map(|caps| {
                let inner = caps.get(1)?.as_str();
                let stripped = TAG.replace_all(inner, "");
                let unescaped = unescape(&stripped);
                let trimmed = unescaped.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(CodeFragment {
                        language: None,
                        text: trimmed.to_string(),
                    })
                }
            })
            .collect()
    }
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Two-stage extractor: primary parser, then a delayed fallback when the
/// primary finds nothing.
pub struct CodeExtractor {
    primary: Box<dyn CodeBlockParser>,
    fallback: Option<Box<dyn CodeBlockParser>>,
    fallback_delay: Duration,
}

impl CodeExtractor {
    pub fn new(fallback_delay: Duration) -> Self {
        Self {
            primary: Box::new(FencedBlockParser),
            fallback: Some(Box::new(RenderedCodeParser)),
            fallback_delay,
        }
    }

    /// Replace the parsers (e.g. when the page exposes its own).
    pub fn with_parsers(
        primary: Box<dyn CodeBlockParser>,
        fallback: Option<Box<dyn CodeBlockParser>>,
        fallback_delay: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            fallback_delay,
        }
    }

    /// Extract fragments, falling back after the configured delay when
    /// the primary parser comes up empty.
    pub async fn extract(&self, text: &str) -> Vec<CodeFragment> {
        let fragments = self.primary.parse(text);
        if !fragments.is_empty() {
            return fragments;
        }

        let Some(fallback) = &self.fallback else {
            return fragments;
        };
        tokio::time::sleep(self.fallback_delay).await;
        fallback.parse(text)
    }
}
