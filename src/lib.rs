//! Binary-log distribution layer for a machine-translation platform.
//!
//! Translation-unit and deletion events are appended to a partitioned,
//! append-only log by producers, then continuously pulled back by a single
//! polling worker, enriched in batches (tokenization and word alignment) and
//! fanned out in parallel to every registered downstream listener. Each
//! listener keeps its own durable per-channel position, so after a crash the
//! log is resumed from the minimum position across all listeners and nobody
//! loses data.
//!
//! Architecture:
//! - [`log::BinaryLog`] is the public facade: append operations, listener
//!   registration, connect/resume and position waits.
//! - [`transport`] abstracts the physical log service (append, blocking poll,
//!   seek); [`transport::MemoryLog`] is the process-local implementation used
//!   by single-node deployments and the test-suite.
//! - [`processing`] abstracts the external NLP pipeline invoked during batch
//!   assembly.
//! - [`data`] holds the listener contract and the enriched message types
//!   shared read-only between listeners.

pub mod config;
pub mod data;
pub mod error;
pub mod log;
pub mod model;
pub mod processing;
pub mod transport;

// Shared mock collaborators for unit tests (integration tests under tests/
// carry their own copies, as they cannot see cfg(test) items).
#[cfg(test)]
pub(crate) mod testing;

pub use config::BinaryLogConfig;
pub use error::{BinaryLogError, Result};
pub use log::{BinaryLog, LogChannel, CONTRIBUTIONS_CHANNEL, MEMORY_UPLOAD_CHANNEL};
