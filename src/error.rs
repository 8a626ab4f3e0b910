//! Crate-wide error types.
//!
//! Producer-path errors are returned synchronously to the caller. Fatal
//! poll-loop errors (corrupted packets, enrichment failures) halt ingestion
//! and are re-raised to later append calls, because skipping a record would
//! desynchronize per-channel position accounting across listeners. Listener
//! delivery errors are logged and contained per listener, never raised here.

use thiserror::Error;

use crate::processing::{AlignmentError, ProcessingError};
use crate::transport::TransportError;

/// Errors surfaced by the binary log facade.
#[derive(Error, Debug)]
pub enum BinaryLogError {
    /// Could not reach the log service within the connect timeout.
    #[error("host unreachable: {hosts:?} on port {port}")]
    HostUnreachable { hosts: Vec<String>, port: u16 },

    /// A record pulled from the log could not be decoded.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// The external tokenizer failed while enriching a batch.
    #[error("failed to process update batch: {0}")]
    Processing(#[from] ProcessingError),

    /// The external word aligner failed while enriching a batch.
    #[error("failed to align update batch: {0}")]
    Alignment(#[from] AlignmentError),

    /// Append attempted while no producer connection is available.
    #[error("transport unavailable, connect() not called or log closed")]
    TransportUnavailable,

    /// The polling worker halted on a fatal error; the original condition is
    /// carried in `reason` and raised to every subsequent producer call.
    #[error("binary log polling halted: {reason}")]
    PollLoopFailed { reason: String },

    /// No channel registered under the given id.
    #[error("unknown log channel: {0}")]
    UnknownChannel(i16),

    /// A blocking wait was aborted because the log is shutting down.
    #[error("wait interrupted by shutdown")]
    Interrupted,

    /// Reading a corpus during upload failed.
    #[error("failed to read corpus for memory {memory}")]
    CorpusRead {
        memory: i64,
        #[source]
        source: std::io::Error,
    },

    /// An operation was attempted in the wrong connection state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The configuration cannot work at runtime.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Error raised by the underlying transport.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Operating-system failure, e.g. spawning the polling worker.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for binary log operations.
pub type Result<T> = std::result::Result<T, BinaryLogError>;
