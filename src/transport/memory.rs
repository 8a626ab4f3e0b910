//! Process-local in-memory log.
//!
//! The production deployment talks to an external replicated log service;
//! single-node engines and the test-suite run against this implementation
//! instead. Semantics match the external service where the binary log can
//! observe them: per-channel append order assigns positions 0, 1, 2, ...,
//! consumers block on `poll()` until records exist past their cursors, and
//! `wakeup()` interrupts the current or the next poll.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use super::{
    LogConsumer, LogProducer, LogTransport, PendingAppend, PollError, RawRecord, TransportError,
};
use crate::data::ChannelId;

#[derive(Default)]
struct Shared {
    channels: HashMap<ChannelId, Vec<Bytes>>,
}

struct State {
    shared: Mutex<Shared>,
    data_available: Condvar,
}

/// An in-memory [`LogTransport`] shared by cloning.
#[derive(Clone)]
pub struct MemoryLog {
    state: Arc<State>,
}

impl MemoryLog {
    pub fn new(channels: &[ChannelId]) -> Self {
        let mut shared = Shared::default();
        for &channel in channels {
            shared.channels.insert(channel, Vec::new());
        }

        MemoryLog {
            state: Arc::new(State {
                shared: Mutex::new(shared),
                data_available: Condvar::new(),
            }),
        }
    }

    /// Number of records ever appended to `channel`.
    pub fn len(&self, channel: ChannelId) -> usize {
        self.state
            .shared
            .lock()
            .channels
            .get(&channel)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self, channel: ChannelId) -> bool {
        self.len(channel) == 0
    }
}

impl LogTransport for MemoryLog {
    fn open_producer(&self) -> Result<Box<dyn LogProducer>, TransportError> {
        Ok(Box::new(MemoryProducer {
            state: self.state.clone(),
        }))
    }

    fn open_consumer(&self, channels: &[ChannelId]) -> Result<Box<dyn LogConsumer>, TransportError> {
        let shared = self.state.shared.lock();
        for channel in channels {
            if !shared.channels.contains_key(channel) {
                return Err(TransportError::UnknownChannel(*channel));
            }
        }
        drop(shared);

        Ok(Box::new(MemoryConsumer {
            state: self.state.clone(),
            cursors: Mutex::new(channels.iter().map(|&c| (c, 0i64)).collect()),
            woken: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemoryProducer {
    state: Arc<State>,
}

impl LogProducer for MemoryProducer {
    fn append(&self, channel: ChannelId, payload: Vec<u8>) -> Result<PendingAppend, TransportError> {
        let mut shared = self.state.shared.lock();
        let log = shared
            .channels
            .get_mut(&channel)
            .ok_or(TransportError::UnknownChannel(channel))?;

        log.push(Bytes::from(payload));
        let position = (log.len() - 1) as i64;
        drop(shared);

        self.state.data_available.notify_all();
        Ok(PendingAppend::ready(position))
    }

    fn close(&self) {}
}

struct MemoryConsumer {
    state: Arc<State>,
    cursors: Mutex<HashMap<ChannelId, i64>>,
    woken: AtomicBool,
    closed: AtomicBool,
}

impl LogConsumer for MemoryConsumer {
    fn poll(&self) -> Result<Vec<RawRecord>, PollError> {
        let mut shared = self.state.shared.lock();

        loop {
            if self.woken.swap(false, Ordering::SeqCst) {
                return Err(PollError::WokenUp);
            }
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed.into());
            }

            let mut records = Vec::new();
            {
                let mut cursors = self.cursors.lock();
                for (&channel, cursor) in cursors.iter_mut() {
                    let log = match shared.channels.get(&channel) {
                        Some(log) => log,
                        None => continue,
                    };
                    while (*cursor as usize) < log.len() {
                        records.push(RawRecord {
                            channel,
                            position: *cursor,
                            payload: log[*cursor as usize].clone(),
                        });
                        *cursor += 1;
                    }
                }
            }

            if !records.is_empty() {
                // Deterministic window order; per-channel order is already
                // ascending by construction.
                records.sort_by_key(|r| (r.channel, r.position));
                return Ok(records);
            }

            self.state.data_available.wait(&mut shared);
        }
    }

    fn seek(&self, channel: ChannelId, position: i64) -> Result<(), TransportError> {
        let mut cursors = self.cursors.lock();
        match cursors.get_mut(&channel) {
            Some(cursor) => {
                *cursor = position.max(0);
                Ok(())
            }
            None => Err(TransportError::UnknownChannel(channel)),
        }
    }

    fn tail_position(&self, channel: ChannelId) -> Result<i64, TransportError> {
        let shared = self.state.shared.lock();
        shared
            .channels
            .get(&channel)
            .map(|log| log.len() as i64)
            .ok_or(TransportError::UnknownChannel(channel))
    }

    fn wakeup(&self) {
        // Hold the state lock while raising the flag so a poll cannot slip
        // between its flag check and the condvar wait.
        let _guard = self.state.shared.lock();
        self.woken.store(true, Ordering::SeqCst);
        drop(_guard);
        self.state.data_available.notify_all();
    }

    fn close(&self) {
        let _guard = self.state.shared.lock();
        self.closed.store(true, Ordering::SeqCst);
        drop(_guard);
        self.state.data_available.notify_all();
    }
}
