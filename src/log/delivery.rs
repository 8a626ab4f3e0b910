//! Parallel batch delivery.
//!
//! One worker thread per registered listener, created once per binary log
//! instance. Each cycle the polling worker hands the shared batch to every
//! worker and blocks until all of them report back: the batch counts as
//! delivered only after the whole fan-out completed, successfully or not.
//! A failing listener is logged and isolated; it never blocks delivery to
//! the others and never stops the polling worker.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, warn};

use crate::data::{DataBatch, DataListener, DeliveryError};

struct Worker {
    listener_name: String,
    jobs: Sender<Arc<DataBatch>>,
    handle: Option<thread::JoinHandle<()>>,
}

struct Report {
    listener_name: String,
    outcome: Result<(), DeliveryError>,
}

pub(crate) struct DeliveryPool {
    workers: Vec<Worker>,
    reports: Receiver<Report>,
}

impl DeliveryPool {
    pub fn new(listeners: &[Arc<dyn DataListener>]) -> Self {
        let (report_tx, reports) = unbounded();

        let workers = listeners
            .iter()
            .map(|listener| spawn_worker(listener.clone(), report_tx.clone()))
            .collect();

        DeliveryPool { workers, reports }
    }

    /// Deliver `batch` to every listener in parallel and wait for all of
    /// them to finish. Failures are logged per listener.
    pub fn deliver(&self, batch: &Arc<DataBatch>) {
        if self.workers.is_empty() {
            warn!(updates = batch.size(), "discarding batch, no listeners registered");
            return;
        }

        let mut dispatched = 0;
        for worker in &self.workers {
            if worker.jobs.send(batch.clone()).is_ok() {
                dispatched += 1;
            }
        }

        for _ in 0..dispatched {
            match self.reports.recv() {
                Ok(report) => {
                    if let Err(error) = report.outcome {
                        warn!(
                            listener = report.listener_name.as_str(),
                            %error,
                            "failed to deliver updates to listener"
                        );
                    }
                }
                // All workers gone; nothing left to wait for.
                Err(_) => break,
            }
        }

        debug!(size = batch.size(), "batch delivered");
    }

    pub fn shutdown(self) {
        let mut joins = Vec::with_capacity(self.workers.len());
        for worker in self.workers {
            let Worker {
                listener_name,
                jobs,
                handle,
            } = worker;
            // Closing the job channel stops the worker loop.
            drop(jobs);
            if let Some(handle) = handle {
                joins.push((listener_name, handle));
            }
        }
        for (listener_name, handle) in joins {
            if handle.join().is_err() {
                warn!(
                    listener = listener_name.as_str(),
                    "delivery worker terminated abnormally"
                );
            }
        }
    }
}

fn spawn_worker(listener: Arc<dyn DataListener>, reports: Sender<Report>) -> Worker {
    let (jobs, job_rx): (Sender<Arc<DataBatch>>, Receiver<Arc<DataBatch>>) = unbounded();
    let listener_name = listener.name().to_string();
    let thread_name = format!("delivery-{}", listener_name);

    let name_for_thread = listener_name.clone();
    let handle = thread::Builder::new()
        .name(thread_name)
        .spawn(move || {
            while let Ok(batch) = job_rx.recv() {
                let outcome = apply(listener.as_ref(), &batch);
                // Release the batch before reporting so the polling worker
                // can recover the buffers after the barrier.
                drop(batch);
                let report = Report {
                    listener_name: name_for_thread.clone(),
                    outcome,
                };
                if reports.send(report).is_err() {
                    break;
                }
            }
        })
        .ok();

    Worker {
        listener_name,
        jobs,
        handle,
    }
}

/// Apply one batch to one listener: units first (only when present), then
/// each deletion individually. A panicking listener must not wedge the
/// cycle barrier, so panics are converted into delivery errors.
fn apply(listener: &dyn DataListener, batch: &DataBatch) -> Result<(), DeliveryError> {
    let result = catch_unwind(AssertUnwindSafe(|| -> Result<(), DeliveryError> {
        if !batch.translation_units().is_empty() {
            listener.on_data_received(batch)?;
        }
        for deletion in batch.deletions() {
            listener.on_delete(deletion)?;
        }
        Ok(())
    }));

    match result {
        Ok(outcome) => outcome,
        Err(_) => Err(DeliveryError::new("listener panicked")),
    }
}
