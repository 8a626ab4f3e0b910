//! Language tags, directions and the supported-direction index.
//!
//! Tags are a simplified BCP 47 subset: a lowercase language subtag with an
//! optional uppercase region subtag ("en", "en-US", "zh-TW"). That is all the
//! translation pipeline distinguishes between.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Raised when a language tag cannot be parsed.
#[derive(Error, Debug)]
#[error("invalid language tag: {0:?}")]
pub struct InvalidLanguageTag(pub String);

/// A language, optionally narrowed to a region.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Language {
    language: String,
    region: Option<String>,
}

impl Language {
    pub fn new(language: &str) -> Result<Self, InvalidLanguageTag> {
        language.parse()
    }

    pub fn with_region(language: &str, region: &str) -> Result<Self, InvalidLanguageTag> {
        format!("{}-{}", language, region).parse()
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// The same language with the region stripped ("en-US" -> "en").
    pub fn language_only(&self) -> Language {
        Language {
            language: self.language.clone(),
            region: None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{}-{}", self.language, region),
            None => f.write_str(&self.language),
        }
    }
}

impl FromStr for Language {
    type Err = InvalidLanguageTag;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let mut parts = tag.split(['-', '_']);

        let language = match parts.next() {
            Some(l) if (2..=3).contains(&l.len()) && l.chars().all(|c| c.is_ascii_alphabetic()) => {
                l.to_ascii_lowercase()
            }
            _ => return Err(InvalidLanguageTag(tag.to_string())),
        };

        let region = match parts.next() {
            None => None,
            Some(r) if r.len() == 2 && r.chars().all(|c| c.is_ascii_alphabetic()) => {
                Some(r.to_ascii_uppercase())
            }
            _ => return Err(InvalidLanguageTag(tag.to_string())),
        };

        if parts.next().is_some() {
            return Err(InvalidLanguageTag(tag.to_string()));
        }

        Ok(Language { language, region })
    }
}

/// A translation direction, source language to target language.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LanguageDirection {
    pub source: Language,
    pub target: Language,
}

impl LanguageDirection {
    pub fn new(source: Language, target: Language) -> Self {
        LanguageDirection { source, target }
    }

    /// Parse from a pair of tags, e.g. `("en", "it")`.
    pub fn parse(source: &str, target: &str) -> Result<Self, InvalidLanguageTag> {
        Ok(LanguageDirection {
            source: source.parse()?,
            target: target.parse()?,
        })
    }

    pub fn reversed(&self) -> LanguageDirection {
        LanguageDirection {
            source: self.target.clone(),
            target: self.source.clone(),
        }
    }

    fn language_only(&self) -> LanguageDirection {
        LanguageDirection {
            source: self.source.language_only(),
            target: self.target.language_only(),
        }
    }
}

impl fmt::Display for LanguageDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} > {}", self.source, self.target)
    }
}

/// The set of translation directions an engine supports.
///
/// Incoming records carry arbitrary client-provided directions; the index
/// resolves each of them to the canonical supported direction the NLP
/// pipeline must be invoked with. Records that resolve to nothing are not
/// translatable by this engine and are skipped during batch assembly.
#[derive(Debug, Clone)]
pub struct LanguageIndex {
    exact: HashMap<LanguageDirection, LanguageDirection>,
    by_language: HashMap<LanguageDirection, LanguageDirection>,
}

impl LanguageIndex {
    pub fn new<I>(directions: I) -> Self
    where
        I: IntoIterator<Item = LanguageDirection>,
    {
        let mut exact = HashMap::new();
        let mut by_language = HashMap::new();

        for direction in directions {
            // First registration wins, so the configured order decides which
            // regional variant is canonical for a language-only match.
            by_language
                .entry(direction.language_only())
                .or_insert_with(|| direction.clone());
            exact.entry(direction.clone()).or_insert(direction);
        }

        LanguageIndex { exact, by_language }
    }

    /// Resolve `direction` to the closest supported direction: an exact match
    /// first, then a match on bare languages with regions ignored.
    pub fn map_to_best_matching(&self, direction: &LanguageDirection) -> Option<&LanguageDirection> {
        if let Some(found) = self.exact.get(direction) {
            return Some(found);
        }
        self.by_language.get(&direction.language_only())
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }
}
