//! Mock collaborators shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::data::{ChannelId, DataBatch, DataListener, Deletion, DeliveryError};
use crate::log::UnitPayload;
use crate::model::{Alignment, LanguageDirection, Sentence};
use crate::processing::{AlignmentError, ProcessingError, TextProcessor, WordAligner};

/// Poll `predicate` every few milliseconds until it holds or `timeout`
/// expires.
pub fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

pub fn unit_payload(source: &str, target: &str, sentence: &str, translation: &str) -> UnitPayload {
    UnitPayload {
        direction: LanguageDirection::parse(source, target).unwrap(),
        owner: None,
        memory: 1,
        tuid: None,
        sentence: sentence.to_string(),
        translation: translation.to_string(),
        timestamp: None,
    }
}

/// Tokenizer splitting on ASCII whitespace.
pub struct WhitespaceProcessor;

impl TextProcessor for WhitespaceProcessor {
    fn process(
        &self,
        _direction: &LanguageDirection,
        texts: &[String],
    ) -> Result<Vec<Sentence>, ProcessingError> {
        Ok(texts
            .iter()
            .map(|text| Sentence::new(text.split_whitespace().map(str::to_string).collect()))
            .collect())
    }
}

/// Aligner linking tokens pairwise up to the shorter sentence.
pub struct XorAligner;

impl WordAligner for XorAligner {
    fn align(
        &self,
        _direction: &LanguageDirection,
        sources: &[Sentence],
        targets: &[Sentence],
    ) -> Result<Vec<Alignment>, AlignmentError> {
        Ok(sources
            .iter()
            .zip(targets)
            .map(|(source, target)| {
                let links = (0..source.len().min(target.len()))
                    .map(|i| (i as u16, i as u16))
                    .collect();
                Alignment::new(links, 1.0)
            })
            .collect())
    }
}

pub struct FailingProcessor;

impl TextProcessor for FailingProcessor {
    fn process(
        &self,
        _direction: &LanguageDirection,
        _texts: &[String],
    ) -> Result<Vec<Sentence>, ProcessingError> {
        Err(ProcessingError::new("tokenizer unavailable"))
    }
}

pub struct FailingAligner;

impl WordAligner for FailingAligner {
    fn align(
        &self,
        _direction: &LanguageDirection,
        _sources: &[Sentence],
        _targets: &[Sentence],
    ) -> Result<Vec<Alignment>, AlignmentError> {
        Err(AlignmentError::new("aligner unavailable"))
    }
}

/// A listener that applies batches the way a real store would: it keeps a
/// per-channel watermark and discards positions it has already applied, so
/// re-delivery tests can assert idempotency.
pub struct RecordingListener {
    name: String,
    needs_processing: bool,
    needs_alignment: bool,
    state: Mutex<RecordingState>,
    batches: AtomicUsize,
    enriched_units: AtomicUsize,
}

#[derive(Default)]
struct RecordingState {
    applied: HashMap<ChannelId, Vec<i64>>,
    deleted: Vec<i64>,
    watermark: HashMap<ChannelId, i64>,
}

impl RecordingListener {
    pub fn new(name: &str) -> Self {
        RecordingListener {
            name: name.to_string(),
            needs_processing: true,
            needs_alignment: true,
            state: Mutex::new(RecordingState::default()),
            batches: AtomicUsize::new(0),
            enriched_units: AtomicUsize::new(0),
        }
    }

    pub fn with_needs(name: &str, needs_processing: bool, needs_alignment: bool) -> Self {
        RecordingListener {
            needs_processing,
            needs_alignment,
            ..RecordingListener::new(name)
        }
    }

    pub fn applied_positions(&self, channel: ChannelId) -> Vec<i64> {
        self.state
            .lock()
            .applied
            .get(&channel)
            .cloned()
            .unwrap_or_default()
    }

    pub fn deleted_memories(&self) -> Vec<i64> {
        self.state.lock().deleted.clone()
    }

    pub fn batches_received(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// How many applied units carried a tokenized sentence.
    pub fn enriched_units(&self) -> usize {
        self.enriched_units.load(Ordering::SeqCst)
    }

    fn advance(state: &mut RecordingState, channel: ChannelId, position: i64) -> bool {
        let watermark = state.watermark.entry(channel).or_insert(-1);
        if position <= *watermark {
            return false;
        }
        *watermark = position;
        true
    }
}

impl DataListener for RecordingListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_data_received(&self, batch: &DataBatch) -> Result<(), DeliveryError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        for unit in batch.translation_units() {
            if Self::advance(&mut state, unit.channel, unit.position) {
                state
                    .applied
                    .entry(unit.channel)
                    .or_default()
                    .push(unit.position);
                if unit.sentence.is_some() {
                    self.enriched_units.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
        Ok(())
    }

    fn on_delete(&self, deletion: &Deletion) -> Result<(), DeliveryError> {
        let mut state = self.state.lock();
        if Self::advance(&mut state, deletion.channel, deletion.position) {
            state.deleted.push(deletion.memory);
        }
        Ok(())
    }

    fn latest_channel_positions(&self) -> HashMap<ChannelId, i64> {
        self.state.lock().watermark.clone()
    }

    fn needs_processing(&self) -> bool {
        self.needs_processing
    }

    fn needs_alignment(&self) -> bool {
        self.needs_alignment
    }
}

/// A listener that only reports a fixed watermark; used by the aggregate
/// computation tests.
pub struct PositionsListener {
    positions: HashMap<ChannelId, i64>,
}

impl PositionsListener {
    pub fn new(positions: &[(ChannelId, i64)]) -> Self {
        PositionsListener {
            positions: positions.iter().copied().collect(),
        }
    }
}

impl DataListener for PositionsListener {
    fn name(&self) -> &str {
        "positions"
    }

    fn on_data_received(&self, _batch: &DataBatch) -> Result<(), DeliveryError> {
        Ok(())
    }

    fn on_delete(&self, _deletion: &Deletion) -> Result<(), DeliveryError> {
        Ok(())
    }

    fn latest_channel_positions(&self) -> HashMap<ChannelId, i64> {
        self.positions.clone()
    }

    fn needs_processing(&self) -> bool {
        false
    }

    fn needs_alignment(&self) -> bool {
        false
    }
}

/// A listener whose delivery always fails.
pub struct FailingListener {
    name: String,
}

impl FailingListener {
    pub fn new(name: &str) -> Self {
        FailingListener {
            name: name.to_string(),
        }
    }
}

impl DataListener for FailingListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_data_received(&self, _batch: &DataBatch) -> Result<(), DeliveryError> {
        Err(DeliveryError::new("store offline"))
    }

    fn on_delete(&self, _deletion: &Deletion) -> Result<(), DeliveryError> {
        Err(DeliveryError::new("store offline"))
    }

    fn latest_channel_positions(&self) -> HashMap<ChannelId, i64> {
        HashMap::new()
    }

    fn needs_processing(&self) -> bool {
        false
    }

    fn needs_alignment(&self) -> bool {
        false
    }
}
