//! Bilingual corpus reading for bulk uploads.

use std::io;

use chrono::{DateTime, Utc};

use super::language::LanguageDirection;

/// One parallel sentence pair read from a corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct StringPair {
    pub direction: LanguageDirection,
    pub source: String,
    pub target: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl StringPair {
    pub fn new(direction: LanguageDirection, source: &str, target: &str) -> Self {
        StringPair {
            direction,
            source: source.to_string(),
            target: target.to_string(),
            timestamp: None,
        }
    }
}

/// Sequential reader over the pairs of a corpus. `Ok(None)` marks the end.
pub trait CorpusReader {
    fn read(&mut self) -> io::Result<Option<StringPair>>;
}

/// A bilingual corpus that can be read end to end for upload.
pub trait ParallelCorpus {
    fn name(&self) -> &str;

    fn content_reader(&self) -> io::Result<Box<dyn CorpusReader + Send + '_>>;
}

/// A corpus held entirely in memory. Upload tools build these from parsed
/// files before handing them to the binary log.
#[derive(Debug, Clone, Default)]
pub struct StringPairCorpus {
    name: String,
    pairs: Vec<StringPair>,
}

impl StringPairCorpus {
    pub fn new(name: &str, pairs: Vec<StringPair>) -> Self {
        StringPairCorpus {
            name: name.to_string(),
            pairs,
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl ParallelCorpus for StringPairCorpus {
    fn name(&self) -> &str {
        &self.name
    }

    fn content_reader(&self) -> io::Result<Box<dyn CorpusReader + Send + '_>> {
        Ok(Box::new(StringPairReader {
            pairs: &self.pairs,
            next: 0,
        }))
    }
}

struct StringPairReader<'a> {
    pairs: &'a [StringPair],
    next: usize,
}

impl CorpusReader for StringPairReader<'_> {
    fn read(&mut self) -> io::Result<Option<StringPair>> {
        match self.pairs.get(self.next) {
            Some(pair) => {
                self.next += 1;
                Ok(Some(pair.clone()))
            }
            None => Ok(None),
        }
    }
}
