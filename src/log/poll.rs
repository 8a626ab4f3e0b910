//! The polling worker.
//!
//! Exactly one worker per binary log instance pulls windows from the
//! transport, drives batch assembly and fans the result out through the
//! delivery pool. Serializing assembly on one thread is what guarantees that
//! within a channel listeners observe non-decreasing positions across
//! batches.
//!
//! Fatal conditions (malformed packet, enrichment failure, transport error)
//! halt the worker instead of skipping records: skipping would silently
//! desynchronize position accounting between listeners. The stored fault is
//! re-raised to every later producer call through `ensure_running`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use super::batch::BatchAssembler;
use super::delivery::DeliveryPool;
use crate::data::{DataBatch, DataListener, LogListener};
use crate::error::BinaryLogError;
use crate::transport::{LogConsumer, PollError};

/// Handle on the running polling worker, owned by the facade.
pub(crate) struct PollingThread {
    stopping: Arc<AtomicBool>,
    consumer: Arc<dyn LogConsumer>,
    done: Receiver<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PollingThread {
    /// Spawn the worker. `fault` is shared with the facade, which checks it
    /// on every append.
    pub fn spawn(
        consumer: Arc<dyn LogConsumer>,
        listeners: Vec<Arc<dyn DataListener>>,
        log_listener: Arc<Mutex<Option<Arc<dyn LogListener>>>>,
        assembler: BatchAssembler,
        fault: Arc<Mutex<Option<String>>>,
    ) -> std::io::Result<Self> {
        let stopping = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = bounded(1);

        let handle = thread::Builder::new().name("binlog-poll".to_string()).spawn({
            let consumer = consumer.clone();
            let stopping = stopping.clone();
            move || run(consumer, listeners, log_listener, assembler, fault, stopping, done_tx)
        })?;

        Ok(PollingThread {
            stopping,
            consumer,
            done: done_rx,
            handle: Some(handle),
        })
    }

    /// Signal the worker to stop, unblock its poll and wait up to `grace`
    /// for it to exit. A worker that does not make it in time is abandoned;
    /// it holds no resource beyond the consumer handle it will close itself.
    pub fn shutdown(mut self, grace: Duration) {
        self.stopping.store(true, Ordering::SeqCst);
        self.consumer.wakeup();

        match self.done.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("polling worker did not stop within grace period, abandoning it");
                self.consumer.wakeup();
            }
        }
    }
}

fn run(
    consumer: Arc<dyn LogConsumer>,
    listeners: Vec<Arc<dyn DataListener>>,
    log_listener: Arc<Mutex<Option<Arc<dyn LogListener>>>>,
    mut assembler: BatchAssembler,
    fault: Arc<Mutex<Option<String>>>,
    stopping: Arc<AtomicBool>,
    done: Sender<()>,
) {
    let pool = DeliveryPool::new(&listeners);
    let mut batch = DataBatch::default();

    while !stopping.load(Ordering::SeqCst) {
        let window = match consumer.poll() {
            Ok(window) => window,
            Err(PollError::WokenUp) => break,
            Err(PollError::Transport(cause)) => {
                let condition = BinaryLogError::from(cause);
                error!(%condition, "transport failure while polling");
                record_fault(&fault, &condition);
                break;
            }
        };
        if window.is_empty() {
            continue;
        }

        // Queried fresh on every cycle so listeners can change their
        // enrichment needs at runtime.
        let mut process = false;
        let mut align = false;
        for listener in &listeners {
            process |= listener.needs_processing();
            align |= listener.needs_alignment();
            if process && align {
                break;
            }
        }

        debug!(records = window.len(), process, align, "loading batch");

        if let Err(condition) = assembler.load(&mut batch, window, process, align) {
            error!(%condition, "failed to parse update batch");
            record_fault(&fault, &condition);
            break;
        }

        debug!(updates = batch.size(), "delivering batch");

        let shared = Arc::new(std::mem::take(&mut batch));
        pool.deliver(&shared);

        let observer = log_listener.lock().clone();
        if let Some(observer) = observer {
            observer.on_batch_processed(shared.channel_positions());
        }

        // Recover the buffers for the next cycle when no delivery worker
        // still holds a reference.
        batch = match Arc::try_unwrap(shared) {
            Ok(mut recovered) => {
                recovered.clear();
                recovered
            }
            Err(_) => DataBatch::default(),
        };
    }

    consumer.close();
    pool.shutdown();
    let _ = done.send(());
}

fn record_fault(fault: &Mutex<Option<String>>, condition: &BinaryLogError) {
    let mut guard = fault.lock();
    // The first fault wins; later ones are consequences.
    if guard.is_none() {
        *guard = Some(condition.to_string());
    }
}
