//! External NLP collaborators invoked during batch assembly.
//!
//! Both calls are batched on purpose: the polling worker groups records by
//! language direction so that one tokenizer call and one aligner call cover
//! the whole group, amortizing the round-trip to the NLP services over
//! possibly hundreds of records per cycle.

use thiserror::Error;

use crate::model::{Alignment, LanguageDirection, Sentence};

/// Failure of the tokenization pipeline. Fatal to the whole batch: partial
/// enrichment would leave listeners with diverging views of the same window.
#[derive(Error, Debug)]
#[error("text processing failed: {message}")]
pub struct ProcessingError {
    message: String,
}

impl ProcessingError {
    pub fn new(message: impl Into<String>) -> Self {
        ProcessingError {
            message: message.into(),
        }
    }
}

/// Failure of the word aligner. Fatal to the whole batch, as above.
#[derive(Error, Debug)]
#[error("word alignment failed: {message}")]
pub struct AlignmentError {
    message: String,
}

impl AlignmentError {
    pub fn new(message: impl Into<String>) -> Self {
        AlignmentError {
            message: message.into(),
        }
    }
}

/// Batched tokenizer: one call tokenizes all texts of one direction group.
/// The returned list is parallel to `texts`.
pub trait TextProcessor: Send + Sync {
    fn process(
        &self,
        direction: &LanguageDirection,
        texts: &[String],
    ) -> Result<Vec<Sentence>, ProcessingError>;
}

/// Batched word aligner over already tokenized sentence pairs. The returned
/// list is parallel to `sources`/`targets`.
pub trait WordAligner: Send + Sync {
    fn align(
        &self,
        direction: &LanguageDirection,
        sources: &[Sentence],
        targets: &[Sentence],
    ) -> Result<Vec<Alignment>, AlignmentError>;
}
