//! Enriched messages delivered to listeners.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::ChannelId;
use crate::model::{Alignment, LanguageDirection, Sentence};

/// How a translation unit replaces earlier content, if at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOverwrite {
    /// Plain addition.
    None,
    /// Replace the unit previously stored with these exact texts.
    ByValue {
        sentence: String,
        translation: String,
    },
    /// Replace whatever unit carries the same tuid.
    ByTuid,
}

/// A parallel sentence pair pulled from the log, annotated with its channel
/// and position and, when enrichment ran, the tokenized sentences and word
/// alignment.
///
/// Units are immutable once handed to listeners; one instance is shared
/// read-only by every delivery task of a cycle.
#[derive(Debug, Clone)]
pub struct TranslationUnit {
    pub channel: ChannelId,
    pub position: i64,

    pub direction: LanguageDirection,
    pub memory: i64,
    pub owner: Option<Uuid>,
    pub tuid: Option<Uuid>,
    pub raw_sentence: String,
    pub raw_translation: String,
    pub overwrite: UnitOverwrite,
    pub timestamp: Option<DateTime<Utc>>,

    /// Tokenized source, `None` when no listener asked for processing.
    pub sentence: Option<Sentence>,
    /// Tokenized target, `None` when no listener asked for processing.
    pub translation: Option<Sentence>,
    /// Word alignment, `None` when no listener asked for alignment.
    pub alignment: Option<Alignment>,
}

impl TranslationUnit {
    pub fn is_overwrite(&self) -> bool {
        self.overwrite != UnitOverwrite::None
    }
}

/// An instruction to drop every record of a memory from downstream stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    pub channel: ChannelId,
    pub position: i64,
    pub memory: i64,
}

impl Deletion {
    pub fn new(channel: ChannelId, position: i64, memory: i64) -> Self {
        Deletion {
            channel,
            position,
            memory,
        }
    }
}
