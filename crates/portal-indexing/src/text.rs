//! Normalization of free-text values before they enter the content blob.

use regex::Regex;

use crate::error::IndexingError;

/// Turns stored markup into plain searchable text.
pub trait TextNormalizer: Send + Sync {
    fn normalize(&self, text: &str) -> String;
}

/// Strips HTML tags and Liquid templates, decodes common entities and
/// collapses whitespace.
#[derive(Debug, Clone)]
pub struct MarkupStripper {
    blocks: Regex,
    templates: Regex,
    tags: Regex,
    whitespace: Regex,
}

impl MarkupStripper {
    pub fn new() -> Result<Self, IndexingError> {
        Ok(Self {
            // Script and style bodies are never content.
            blocks: Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>")?,
            templates: Regex::new(r"(?s)\{%.*?%\}|\{\{.*?\}\}")?,
            tags: Regex::new(r"(?s)<[^>]*>")?,
            whitespace: Regex::new(r"\s+")?,
        })
    }
}

impl TextNormalizer for MarkupStripper {
    fn normalize(&self, text: &str) -> String {
        let text = self.blocks.replace_all(text, " ");
        let text = self.templates.replace_all(&text, " ");
        let text = self.tags.replace_all(&text, " ");
        let text = decode_entities(&text);
        self.whitespace.replace_all(&text, " ").trim().to_string()
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(text: &str) -> String {
        MarkupStripper::new().unwrap().normalize(text)
    }

    #[test]
    fn test_strips_tags_and_collapses_whitespace() {
        assert_eq!(
            strip("<p>Hello\n\n  <b>world</b></p>"),
            "Hello world"
        );
    }

    #[test]
    fn test_strips_liquid_templates() {
        assert_eq!(
            strip("Welcome {{ user.fullname }}!{% if page %} Visit {% endif %}"),
            "Welcome ! Visit"
        );
    }

    #[test]
    fn test_drops_script_bodies() {
        assert_eq!(strip("a<script>var x = 1;</script>b"), "a b");
    }

    #[test]
    fn test_decodes_entities_once() {
        assert_eq!(strip("Fish &amp; chips &amp;lt;"), "Fish & chips &lt;");
    }
}
