//! The batch delivered to every listener in one poll cycle.

use std::collections::HashMap;

use super::message::{Deletion, TranslationUnit};
use super::ChannelId;

/// One poll cycle's worth of enriched messages.
///
/// A batch is transient: it is rebuilt on every cycle and its buffers are
/// recycled afterwards. `channel_positions` holds, for each channel that
/// contributed at least one record, the maximum position observed in the
/// window, including records that were dropped from delivery (deletions count,
/// and so do units with unsupported directions).
#[derive(Debug, Default)]
pub struct DataBatch {
    translation_units: Vec<TranslationUnit>,
    deletions: Vec<Deletion>,
    channel_positions: HashMap<ChannelId, i64>,
}

impl DataBatch {
    pub fn translation_units(&self) -> &[TranslationUnit] {
        &self.translation_units
    }

    pub fn deletions(&self) -> &[Deletion] {
        &self.deletions
    }

    pub fn channel_positions(&self) -> &HashMap<ChannelId, i64> {
        &self.channel_positions
    }

    pub fn size(&self) -> usize {
        self.translation_units.len() + self.deletions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.translation_units.is_empty() && self.deletions.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.translation_units.clear();
        self.deletions.clear();
        self.channel_positions.clear();
    }

    pub(crate) fn reserve_units(&mut self, additional: usize) {
        self.translation_units.reserve(additional);
    }

    pub(crate) fn push_unit(&mut self, unit: TranslationUnit) {
        self.translation_units.push(unit);
    }

    pub(crate) fn push_deletion(&mut self, deletion: Deletion) {
        self.deletions.push(deletion);
    }

    /// Track the maximum observed position for `channel`.
    pub(crate) fn record_position(&mut self, channel: ChannelId, position: i64) {
        let entry = self.channel_positions.entry(channel).or_insert(position);
        if *entry < position {
            *entry = position;
        }
    }
}
