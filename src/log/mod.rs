//! The binary log: append path, polling worker, batch assembly, fan-out.

mod batch;
mod binary_log;
mod channel;
mod delivery;
mod packet;
mod poll;
mod watermark;

pub use binary_log::{BinaryLog, ConnectionState};
pub use channel::{
    default_channels, default_stream_names, LogChannel, CONTRIBUTIONS_CHANNEL,
    MEMORY_UPLOAD_CHANNEL,
};
pub use packet::{Packet, UnitPayload};
pub use watermark::aggregate_positions;
