//! Text analyzers registered on the content index.
//!
//! The default analyzer lowercases simple tokens. Each supported language
//! adds a stemming analyzer and a matching content field, so a document's
//! text can be analyzed in its own language.

use tantivy::tokenizer::{Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer};
use tantivy::Index;
use tracing::debug;

/// Name of the language-neutral analyzer.
pub const DEFAULT_ANALYZER: &str = "portal_default";

/// Languages with a dedicated stemming analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentLanguage {
    Danish,
    Dutch,
    English,
    Finnish,
    French,
    German,
    Italian,
    Norwegian,
    Portuguese,
    Russian,
    Spanish,
    Swedish,
}

impl ContentLanguage {
    pub const ALL: [ContentLanguage; 12] = [
        ContentLanguage::Danish,
        ContentLanguage::Dutch,
        ContentLanguage::English,
        ContentLanguage::Finnish,
        ContentLanguage::French,
        ContentLanguage::German,
        ContentLanguage::Italian,
        ContentLanguage::Norwegian,
        ContentLanguage::Portuguese,
        ContentLanguage::Russian,
        ContentLanguage::Spanish,
        ContentLanguage::Swedish,
    ];

    /// Two-letter ISO 639-1 code.
    pub fn code(&self) -> &'static str {
        match self {
            ContentLanguage::Danish => "da",
            ContentLanguage::Dutch => "nl",
            ContentLanguage::English => "en",
            ContentLanguage::Finnish => "fi",
            ContentLanguage::French => "fr",
            ContentLanguage::German => "de",
            ContentLanguage::Italian => "it",
            ContentLanguage::Norwegian => "no",
            ContentLanguage::Portuguese => "pt",
            ContentLanguage::Russian => "ru",
            ContentLanguage::Spanish => "es",
            ContentLanguage::Swedish => "sv",
        }
    }

    /// Parse a language code such as `fr`, `FR` or `fr-CA`.
    pub fn from_code(code: &str) -> Option<Self> {
        let primary = code.trim().split(['-', '_']).next()?.to_ascii_lowercase();
        match primary.as_str() {
            "nb" | "nn" => Some(ContentLanguage::Norwegian),
            _ => Self::ALL.into_iter().find(|l| l.code() == primary),
        }
    }

    /// Parse a Windows locale id (LCID) such as `1033`.
    pub fn from_lcid(lcid: i64) -> Option<Self> {
        match lcid {
            1030 => Some(ContentLanguage::Danish),
            1043 | 2067 => Some(ContentLanguage::Dutch),
            1033 | 2057 | 3081 | 4105 => Some(ContentLanguage::English),
            1035 => Some(ContentLanguage::Finnish),
            1036 | 2060 | 3084 | 4108 => Some(ContentLanguage::French),
            1031 | 2055 | 3079 => Some(ContentLanguage::German),
            1040 | 2064 => Some(ContentLanguage::Italian),
            1044 | 2068 => Some(ContentLanguage::Norwegian),
            1046 | 2070 => Some(ContentLanguage::Portuguese),
            1049 => Some(ContentLanguage::Russian),
            1034 | 3082 | 2058 => Some(ContentLanguage::Spanish),
            1053 => Some(ContentLanguage::Swedish),
            _ => None,
        }
    }

    /// Registered tokenizer name.
    pub fn analyzer_name(&self) -> String {
        format!("portal_{}", self.code())
    }

    /// Name of the content field analyzed in this language.
    pub fn content_field_name(&self) -> String {
        format!("content_{}", self.code())
    }

    fn stemmer_language(&self) -> Language {
        match self {
            ContentLanguage::Danish => Language::Danish,
            ContentLanguage::Dutch => Language::Dutch,
            ContentLanguage::English => Language::English,
            ContentLanguage::Finnish => Language::Finnish,
            ContentLanguage::French => Language::French,
            ContentLanguage::German => Language::German,
            ContentLanguage::Italian => Language::Italian,
            ContentLanguage::Norwegian => Language::Norwegian,
            ContentLanguage::Portuguese => Language::Portuguese,
            ContentLanguage::Russian => Language::Russian,
            ContentLanguage::Spanish => Language::Spanish,
            ContentLanguage::Swedish => Language::Swedish,
        }
    }
}

/// Analyzer chosen for a document's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Analyzer {
    #[default]
    Default,
    Language(ContentLanguage),
}

impl Analyzer {
    /// Analyzer for a language id: an LCID number or a language code.
    /// Unsupported languages fall back to the default analyzer.
    pub fn for_language_id(language_id: &str) -> Self {
        let language = match language_id.trim().parse::<i64>() {
            Ok(lcid) => ContentLanguage::from_lcid(lcid),
            Err(_) => ContentLanguage::from_code(language_id),
        };
        language.map(Analyzer::Language).unwrap_or_default()
    }
}

/// Register the default and every language analyzer on `index`.
pub fn register_analyzers(index: &Index) {
    let default = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(DEFAULT_ANALYZER, default);

    for language in ContentLanguage::ALL {
        let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(40))
            .filter(LowerCaser)
            .filter(Stemmer::new(language.stemmer_language()))
            .build();
        index.tokenizers().register(&language.analyzer_name(), analyzer);
    }
    debug!(languages = ContentLanguage::ALL.len(), "Registered analyzers");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code() {
        assert_eq!(ContentLanguage::from_code("FR"), Some(ContentLanguage::French));
        assert_eq!(ContentLanguage::from_code("en-US"), Some(ContentLanguage::English));
        assert_eq!(ContentLanguage::from_code("nb"), Some(ContentLanguage::Norwegian));
        assert_eq!(ContentLanguage::from_code("xx"), None);
        assert_eq!(ContentLanguage::from_code(""), None);
    }

    #[test]
    fn test_analyzer_for_language_id() {
        assert_eq!(
            Analyzer::for_language_id("1036"),
            Analyzer::Language(ContentLanguage::French)
        );
        assert_eq!(
            Analyzer::for_language_id("de"),
            Analyzer::Language(ContentLanguage::German)
        );
        assert_eq!(Analyzer::for_language_id("1041"), Analyzer::Default);
    }

    #[test]
    fn test_analyzer_names_are_distinct() {
        let mut names: Vec<_> = ContentLanguage::ALL.iter().map(|l| l.analyzer_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ContentLanguage::ALL.len());
    }
}
