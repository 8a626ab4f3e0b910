//! Listener traits implemented by downstream stores.

use std::collections::HashMap;

use thiserror::Error;

use super::batch::DataBatch;
use super::message::Deletion;
use super::ChannelId;

/// Error returned by a listener when it fails to apply a batch. Delivery
/// failures are logged and isolated to the failing listener; they never stop
/// the polling worker.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct DeliveryError {
    message: String,
}

impl DeliveryError {
    pub fn new(message: impl Into<String>) -> Self {
        DeliveryError {
            message: message.into(),
        }
    }
}

/// A downstream index fed by the binary log.
///
/// Delivery is at-least-once: after a crash the log replays from the minimum
/// acknowledged position across all listeners, so a listener may see
/// positions it has already applied and must discard them by comparing
/// against its own durable watermark.
pub trait DataListener: Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &str;

    /// Apply all translation units of the batch. Only invoked when the batch
    /// carries at least one unit.
    fn on_data_received(&self, batch: &DataBatch) -> Result<(), DeliveryError>;

    /// Remove every record belonging to the deleted memory.
    fn on_delete(&self, deletion: &Deletion) -> Result<(), DeliveryError>;

    /// The listener's durable high-water mark: for each channel, the last
    /// position it has fully applied. An empty map means "no state yet" and
    /// forces a full replay for everyone on the next connect.
    fn latest_channel_positions(&self) -> HashMap<ChannelId, i64>;

    /// Whether this listener needs tokenized sentences. Queried fresh on
    /// every cycle; enrichment runs if any listener asks for it.
    fn needs_processing(&self) -> bool;

    /// Whether this listener needs word alignments. Implies processing.
    fn needs_alignment(&self) -> bool;
}

/// Observer notified after each batch has been delivered to all listeners.
/// The facade uses it to unblock position waits.
pub trait LogListener: Send + Sync {
    fn on_batch_processed(&self, channel_positions: &HashMap<ChannelId, i64>);
}
