//! Aggregate watermark computation.
//!
//! Each listener owns and persists its own per-channel watermark (the last
//! position it has applied). On every (re)connect the facade asks this module
//! for the position to resume each channel from. The value is recomputed from
//! the listeners on demand and never cached: a cached copy is exactly the
//! kind of state that goes stale while listeners apply batches.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::data::{ChannelId, DataListener};

/// Compute, for every channel, the position the transport should resume
/// reading from so that no listener misses data.
///
/// Per channel this is the minimum of the listeners' last-applied positions,
/// normalized from "last applied" to "next to read" by adding one. A listener
/// that reports no position at all (fresh store, wiped disk) forces the whole
/// resume point back to the start of every channel: it needs the full
/// history, and re-delivery is harmless for the others since they discard
/// already-applied positions.
pub fn aggregate_positions(
    listeners: &[Arc<dyn DataListener>],
    channels: &[ChannelId],
) -> HashMap<ChannelId, i64> {
    let mut result: Option<HashMap<ChannelId, i64>> = None;

    for listener in listeners {
        let latest = listener.latest_channel_positions();
        debug!(
            listener = listener.name(),
            positions = ?latest,
            "listener channel positions"
        );

        if latest.is_empty() {
            result = None;
            break;
        }

        result = Some(match result.take() {
            None => latest,
            Some(mut merged) => {
                for &channel in channels {
                    let known = merged.get(&channel).copied();
                    let reported = latest.get(&channel).copied();
                    let value = match (known, reported) {
                        (Some(a), Some(b)) => a.min(b),
                        // A listener without state for this channel needs it
                        // replayed from the start.
                        _ => -1,
                    };
                    merged.insert(channel, value);
                }
                merged
            }
        });
    }

    let mut result = result.unwrap_or_default();
    for &channel in channels {
        let value = result.entry(channel).or_insert(-1);
        *value = if *value < 0 { 0 } else { *value + 1 };
    }

    result
}
