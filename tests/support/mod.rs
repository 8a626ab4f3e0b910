//! Shared fixtures for the integration suite.
//!
//! These mirror what a real deployment wires in: a store-like listener with
//! a durable watermark, a trivial tokenizer and aligner standing in for the
//! NLP services, and a helper to wait for asynchronous delivery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use mmt_binlog::config::BinaryLogConfig;
use mmt_binlog::data::{ChannelId, DataBatch, DataListener, Deletion, DeliveryError, TranslationUnit};
use mmt_binlog::log::BinaryLog;
use mmt_binlog::model::{Alignment, LanguageDirection, LanguageIndex, Sentence};
use mmt_binlog::processing::{AlignmentError, ProcessingError, TextProcessor, WordAligner};
use mmt_binlog::transport::MemoryLog;

pub fn en_it() -> LanguageDirection {
    LanguageDirection::parse("en", "it").unwrap()
}

/// Poll `predicate` until it holds or `timeout` expires.
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

/// A binary log over a shared in-memory transport, with fast timings for
/// tests.
pub fn binary_log(transport: &MemoryLog) -> BinaryLog {
    let config = BinaryLogConfig {
        wait_poll_interval_ms: 20,
        ..Default::default()
    };
    BinaryLog::new(
        config,
        Arc::new(transport.clone()),
        LanguageIndex::new(vec![en_it()]),
        Some(Arc::new(SpaceTokenizer)),
        Some(Arc::new(DiagonalAligner)),
    )
    .unwrap()
}

pub fn transport() -> MemoryLog {
    MemoryLog::new(&[0, 1])
}

pub struct SpaceTokenizer;

impl TextProcessor for SpaceTokenizer {
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

pub struct DiagonalAligner;

impl WordAligner for DiagonalAligner {
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

/// A listener that behaves like a downstream index: durable watermark,
/// idempotent against re-delivery, optionally broken.
pub struct TestStore {
    name: String,
    needs_processing: bool,
    needs_alignment: bool,
    failing: bool,
    state: Mutex<StoreState>,
    batches: AtomicUsize,
}

#[derive(Default)]
struct StoreState {
    units: Vec<TranslationUnit>,
    deleted: Vec<i64>,
    watermark: HashMap<ChannelId, i64>,
}

impl TestStore {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(TestStore {
            name: name.to_string(),
            needs_processing: true,
            needs_alignment: true,
            failing: false,
            state: Mutex::new(StoreState::default()),
            batches: AtomicUsize::new(0),
        })
    }

    /// A store that already applied everything up to the given positions.
    pub fn with_watermark(name: &str, watermark: &[(ChannelId, i64)]) -> Arc<Self> {
        let store = TestStore::new(name);
        store.state.lock().watermark = watermark.iter().copied().collect();
        store
    }

    /// A store whose deliveries always fail.
    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(TestStore {
            name: name.to_string(),
            needs_processing: false,
            needs_alignment: false,
            failing: true,
            state: Mutex::new(StoreState::default()),
            batches: AtomicUsize::new(0),
        })
    }

    pub fn applied_positions(&self, channel: ChannelId) -> Vec<i64> {
        self.state
            .lock()
            .units
            .iter()
            .filter(|u| u.channel == channel)
            .map(|u| u.position)
            .collect()
    }

    pub fn units(&self) -> Vec<TranslationUnit> {
        self.state.lock().units.clone()
    }

    pub fn deleted_memories(&self) -> Vec<i64> {
        self.state.lock().deleted.clone()
    }

    pub fn batches_received(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    fn advance(state: &mut StoreState, channel: ChannelId, position: i64) -> bool {
        let watermark = state.watermark.entry(channel).or_insert(-1);
        if position <= *watermark {
            return false;
        }
        *watermark = position;
        true
    }
}

impl DataListener for TestStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_data_received(&self, batch: &DataBatch) -> Result<(), DeliveryError> {
        if self.failing {
            return Err(DeliveryError::new("store offline"));
        }
        self.batches.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        for unit in batch.translation_units() {
            if Self::advance(&mut state, unit.channel, unit.position) {
                state.units.push(unit.clone());
            }
        }
        Ok(())
    }

    fn on_delete(&self, deletion: &Deletion) -> Result<(), DeliveryError> {
        if self.failing {
            return Err(DeliveryError::new("store offline"));
        }
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
