//! Batch assembly: raw log records in, enriched messages out.
//!
//! Records pulled in one poll window are partitioned by translation
//! direction so the external tokenizer and aligner are invoked once per
//! direction group instead of once per record; with windows of hundreds of
//! records this batching is what keeps enrichment affordable. Partition
//! buffers are recycled across cycles.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::packet::{Packet, UnitPayload};
use crate::data::{ChannelId, DataBatch, Deletion, TranslationUnit, UnitOverwrite};
use crate::error::{BinaryLogError, Result};
use crate::model::{LanguageDirection, LanguageIndex};
use crate::processing::{AlignmentError, ProcessingError, TextProcessor, WordAligner};
use crate::transport::RawRecord;

pub(crate) struct BatchAssembler {
    languages: LanguageIndex,
    processor: Option<Arc<dyn TextProcessor>>,
    aligner: Option<Arc<dyn WordAligner>>,

    partitions: HashMap<LanguageDirection, DataPartition>,
    spare_partitions: Vec<DataPartition>,
}

impl BatchAssembler {
    pub fn new(
        languages: LanguageIndex,
        processor: Option<Arc<dyn TextProcessor>>,
        aligner: Option<Arc<dyn WordAligner>>,
    ) -> Self {
        BatchAssembler {
            languages,
            processor,
            aligner,
            partitions: HashMap::new(),
            spare_partitions: Vec::new(),
        }
    }

    /// Build `batch` from one poll window.
    ///
    /// Every record advances its channel's maximum position, even records
    /// that do not reach listeners (deletions are routed to the deletion
    /// list, units with unsupported directions are dropped). `process` and
    /// `align` are the OR of the listeners' needs for this cycle.
    ///
    /// A decode or enrichment failure aborts the whole batch: partial
    /// enrichment would hand listeners diverging views of the same window.
    pub fn load(
        &mut self,
        batch: &mut DataBatch,
        window: Vec<RawRecord>,
        process: bool,
        align: bool,
    ) -> Result<()> {
        batch.clear();
        self.recycle_partitions();

        let size = window.len();

        for record in window {
            batch.record_position(record.channel, record.position);

            match Packet::decode(&record.payload)? {
                Packet::Deletion { memory } => {
                    batch.push_deletion(Deletion::new(record.channel, record.position, memory));
                }
                Packet::Addition(unit) => {
                    self.add_unit(record.channel, record.position, unit, UnitOverwrite::None, size);
                }
                Packet::OverwriteByValue {
                    unit,
                    previous_sentence,
                    previous_translation,
                } => {
                    let overwrite = UnitOverwrite::ByValue {
                        sentence: previous_sentence,
                        translation: previous_translation,
                    };
                    self.add_unit(record.channel, record.position, unit, overwrite, size);
                }
                Packet::OverwriteByTuid(unit) => {
                    self.add_unit(record.channel, record.position, unit, UnitOverwrite::ByTuid, size);
                }
            }
        }

        batch.reserve_units(size);

        let directions: Vec<LanguageDirection> = self.partitions.keys().cloned().collect();
        for direction in directions {
            // The partition is put back even if enrichment fails, so the
            // buffers survive for the next cycle.
            let mut partition = self.partitions.remove(&direction).unwrap_or_default();
            let outcome = partition.process(
                &direction,
                self.processor.as_deref(),
                self.aligner.as_deref(),
                process,
                align,
            );

            for unit in partition.units.drain(..) {
                batch.push_unit(unit);
            }
            self.spare_partitions.push(partition.cleared());

            outcome?;
        }

        Ok(())
    }

    fn add_unit(
        &mut self,
        channel: ChannelId,
        position: i64,
        payload: UnitPayload,
        overwrite: UnitOverwrite,
        expected_size: usize,
    ) {
        let mapped = match self.languages.map_to_best_matching(&payload.direction) {
            Some(mapped) => mapped.clone(),
            None => {
                debug!(
                    direction = %payload.direction,
                    position,
                    "dropping unit with unsupported direction"
                );
                return;
            }
        };

        let unit = TranslationUnit {
            channel,
            position,
            direction: payload.direction,
            memory: payload.memory,
            owner: payload.owner,
            tuid: payload.tuid,
            raw_sentence: payload.sentence,
            raw_translation: payload.translation,
            overwrite,
            timestamp: payload.timestamp,
            sentence: None,
            translation: None,
            alignment: None,
        };

        let partition = match self.partitions.entry(mapped) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mut partition = self.spare_partitions.pop().unwrap_or_default();
                partition.reserve(expected_size);
                entry.insert(partition)
            }
        };
        partition.add(unit);
    }

    fn recycle_partitions(&mut self) {
        for (_, partition) in self.partitions.drain() {
            self.spare_partitions.push(partition.cleared());
        }
    }
}

/// All units of one poll window that share a translation direction, together
/// with their raw texts in record order, ready for the batched NLP calls.
#[derive(Default)]
struct DataPartition {
    units: Vec<TranslationUnit>,
    sources: Vec<String>,
    targets: Vec<String>,
}

impl DataPartition {
    fn reserve(&mut self, size: usize) {
        self.units.reserve(size);
        self.sources.reserve(size);
        self.targets.reserve(size);
    }

    fn add(&mut self, unit: TranslationUnit) {
        self.sources.push(unit.raw_sentence.clone());
        self.targets.push(unit.raw_translation.clone());
        self.units.push(unit);
    }

    fn cleared(mut self) -> Self {
        self.units.clear();
        self.sources.clear();
        self.targets.clear();
        self
    }

    /// Tokenize and align the whole partition with one external call per
    /// side, then zip the results back onto the units in record order.
    /// `direction` is the engine-supported direction the records were mapped
    /// to, which may differ from the units' own regional variants.
    fn process(
        &mut self,
        direction: &LanguageDirection,
        processor: Option<&dyn TextProcessor>,
        aligner: Option<&dyn WordAligner>,
        process: bool,
        align: bool,
    ) -> Result<()> {
        if self.units.is_empty() || !(process || align) {
            return Ok(());
        }

        let processor = processor.ok_or_else(|| {
            BinaryLogError::from(ProcessingError::new("no text processor configured"))
        })?;

        let sources = processor.process(direction, &self.sources)?;
        let targets = processor.process(&direction.reversed(), &self.targets)?;

        if sources.len() != self.units.len() || targets.len() != self.units.len() {
            return Err(ProcessingError::new(format!(
                "tokenizer returned {}/{} sentences for {} texts",
                sources.len(),
                targets.len(),
                self.units.len()
            ))
            .into());
        }

        let alignments = if align {
            let aligner = aligner.ok_or_else(|| {
                BinaryLogError::from(AlignmentError::new("no word aligner configured"))
            })?;

            let alignments = aligner.align(direction, &sources, &targets)?;
            if alignments.len() != self.units.len() {
                return Err(AlignmentError::new(format!(
                    "aligner returned {} alignments for {} pairs",
                    alignments.len(),
                    self.units.len()
                ))
                .into());
            }
            Some(alignments)
        } else {
            None
        };

        let mut alignments = alignments.map(|a| a.into_iter());
        for ((unit, source), target) in self.units.iter_mut().zip(sources).zip(targets) {
            unit.sentence = Some(source);
            unit.translation = Some(target);
            if let Some(alignments) = alignments.as_mut() {
                unit.alignment = alignments.next();
            }
        }

        Ok(())
    }
}
