//! Transport abstraction over the physical log service.
//!
//! The binary log owns exactly one producer and one consumer handle, both
//! opened at connect time; listeners never touch the transport directly.
//! `poll()` blocks until records are available and is interruptible through
//! `wakeup()`, which may be called from any thread (this is how shutdown
//! unblocks the polling worker).
//!
//! Positions are assigned by the transport at append time: per channel they
//! are unique and monotonically increasing, across channels no order exists.

mod memory;

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver};
use thiserror::Error;

use crate::data::ChannelId;

pub use memory::MemoryLog;

/// Errors raised by transport implementations.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Could not establish or keep the connection to the log service.
    #[error("log service connection failed: {0}")]
    Connection(String),

    /// The channel is not known to this transport.
    #[error("unknown transport channel {0}")]
    UnknownChannel(ChannelId),

    /// The handle has been closed.
    #[error("transport closed")]
    Closed,

    /// The log service did not acknowledge an append.
    #[error("append failed: {0}")]
    Append(String),
}

/// Errors raised by a blocking [`LogConsumer::poll`] call.
#[derive(Error, Debug)]
pub enum PollError {
    /// The wait was interrupted by [`LogConsumer::wakeup`].
    #[error("poll interrupted by wakeup")]
    WokenUp,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A record as read back from the log: the persisted payload plus the
/// channel and position the transport assigned at append time.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub channel: ChannelId,
    pub position: i64,
    pub payload: Bytes,
}

/// Handle on an append that may still be in flight.
///
/// Synchronous callers block on [`PendingAppend::wait`] for the assigned
/// position; fire-and-forget callers simply drop the handle.
#[derive(Debug)]
pub struct PendingAppend {
    rx: Receiver<Result<i64, TransportError>>,
}

impl PendingAppend {
    /// An append whose outcome will be delivered over `rx`.
    pub fn from_channel(rx: Receiver<Result<i64, TransportError>>) -> Self {
        PendingAppend { rx }
    }

    /// An append that was acknowledged immediately.
    pub fn ready(position: i64) -> Self {
        let (tx, rx) = bounded(1);
        // The receiver is held by self, the send cannot fail.
        let _ = tx.send(Ok(position));
        PendingAppend { rx }
    }

    /// Block until the transport acknowledges the append and return the
    /// assigned position.
    pub fn wait(self) -> Result<i64, TransportError> {
        match self.rx.recv() {
            Ok(result) => result,
            // Sender dropped without acknowledging: the transport went away.
            Err(_) => Err(TransportError::Closed),
        }
    }
}

/// Producer handle: appends packets to channels.
pub trait LogProducer: Send + Sync {
    /// Append `payload` to `channel`. The returned handle resolves to the
    /// position assigned by the log service.
    fn append(&self, channel: ChannelId, payload: Vec<u8>) -> Result<PendingAppend, TransportError>;

    fn close(&self);
}

/// Consumer handle: a read cursor per channel.
pub trait LogConsumer: Send + Sync {
    /// Block until at least one record is available past the current cursors
    /// and return the window. Returns [`PollError::WokenUp`] when unblocked
    /// by [`LogConsumer::wakeup`].
    fn poll(&self) -> Result<Vec<RawRecord>, PollError>;

    /// Move the read cursor of `channel` so the next poll starts at
    /// `position`.
    fn seek(&self, channel: ChannelId, position: i64) -> Result<(), TransportError>;

    /// The position the next appended record on `channel` would receive.
    fn tail_position(&self, channel: ChannelId) -> Result<i64, TransportError>;

    /// Interrupt a blocked or upcoming `poll()`.
    fn wakeup(&self);

    fn close(&self);
}

/// Factory for producer/consumer handles, implemented per log service.
pub trait LogTransport: Send + Sync {
    fn open_producer(&self) -> Result<Box<dyn LogProducer>, TransportError>;

    fn open_consumer(&self, channels: &[ChannelId]) -> Result<Box<dyn LogConsumer>, TransportError>;
}
