//! Domain model shared by the binary log and its collaborators.

mod corpus;
mod import_job;
mod language;
mod memory;
mod sentence;

pub use corpus::{CorpusReader, ParallelCorpus, StringPair, StringPairCorpus};
pub use import_job::ImportJob;
pub use language::{InvalidLanguageTag, Language, LanguageDirection, LanguageIndex};
pub use memory::Memory;
pub use sentence::{Alignment, Sentence};
