//! Log channels.

use crate::data::ChannelId;

/// Channel carrying bulk memory uploads (and memory deletions).
pub const MEMORY_UPLOAD_CHANNEL: ChannelId = 0;
/// Channel carrying live single-pair contributions.
pub const CONTRIBUTIONS_CHANNEL: ChannelId = 1;

/// Longest stream name accepted by the log service.
const MAX_STREAM_NAME_LENGTH: usize = 249;

const MEMORY_UPLOAD_STREAM: &str = "memory-upload-stream";
const CONTRIBUTIONS_STREAM: &str = "contributions-stream";

/// A named, numbered logical partition of the append log. Immutable once
/// created; a deployment has a fixed set of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChannel {
    id: ChannelId,
    name: String,
}

impl LogChannel {
    pub fn new(id: ChannelId, name: &str) -> Self {
        LogChannel {
            id,
            name: name.to_string(),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The two channels of a deployment, streams named after the optional
/// deployment prefix.
pub fn default_channels(prefix: Option<&str>) -> [LogChannel; 2] {
    let [uploads, contributions] = default_stream_names(prefix);
    [
        LogChannel::new(MEMORY_UPLOAD_CHANNEL, &uploads),
        LogChannel::new(CONTRIBUTIONS_CHANNEL, &contributions),
    ]
}

/// Compute the stream names for a deployment, index 0 for memory uploads and
/// index 1 for contributions.
///
/// The prefix is normalized to the characters the log service accepts and
/// truncated so that no resulting name exceeds the service limit.
pub fn default_stream_names(prefix: Option<&str>) -> [String; 2] {
    let mut uploads = MEMORY_UPLOAD_STREAM.to_string();
    let mut contributions = CONTRIBUTIONS_STREAM.to_string();

    if let Some(prefix) = prefix {
        let mut normalized: String = prefix
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
            .collect();

        if !normalized.is_empty() {
            let longest = uploads.len().max(contributions.len());
            let budget = MAX_STREAM_NAME_LENGTH - longest - 1;
            if normalized.len() > budget {
                normalized.truncate(budget);
            }

            uploads = format!("{}-{}", normalized, uploads);
            contributions = format!("{}-{}", normalized, contributions);
        }
    }

    [uploads, contributions]
}
