//! Batch reader threads
//!
//! Each reader pulls tasks from the shared task queue until it is empty,
//! and for every task fetches the payload, decodes it and assembles the
//! batch. Results go to the bounded result queue; a full queue blocks the
//! reader, which is the pipeline's backpressure. When no task is left the
//! reader pushes one [`WorkerMessage::Done`] sentinel and exits.

use crate::assemble::{BatchAssembler, BatchObject};
use crate::error::{BatchFailure, FetchError};
use crate::source::{GraphStoreClient, Submission, TaskDescriptor};
use crate::wire::WireDecoder;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Message from a reader to the loader
#[derive(Debug)]
pub(crate) enum WorkerMessage {
    /// Outcome of one task
    Batch {
        index: usize,
        outcome: Result<BatchObject, BatchFailure>,
    },
    /// The reader found the task queue empty and exited
    Done { worker: usize },
}

/// State shared by every reader of a loader
pub(crate) struct WorkerContext {
    pub client: Arc<dyn GraphStoreClient>,
    pub decoder: WireDecoder,
    pub assembler: BatchAssembler,
    /// Set once by the loader on close
    pub cancel: Arc<AtomicBool>,
    pub poll_interval: Duration,
    pub stream_timeout: Duration,
}

impl WorkerContext {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Fetch, decode and assemble one task
    pub(crate) fn process(&self, task: &TaskDescriptor) -> Result<BatchObject, BatchFailure> {
        let raw = match self.client.submit_batch_task(task)? {
            Submission::Ready(raw) => raw,
            Submission::Stream(handle) => {
                let collected = handle.collect(
                    task.payload,
                    &self.cancel,
                    self.poll_interval,
                    self.stream_timeout,
                );
                self.client.close_stream(handle);
                collected?
            }
        };
        tracing::trace!(
            "Batch {} fetched ({} bytes)",
            task.batch_index,
            raw.byte_len()
        );

        let decoded = self.decoder.decode(&raw)?;
        Ok(self.assembler.assemble(decoded)?)
    }
}

/// One reader thread
pub(crate) struct BatchReader {
    id: usize,
    ctx: Arc<WorkerContext>,
    tasks: Receiver<TaskDescriptor>,
    results: Sender<WorkerMessage>,
}

impl BatchReader {
    pub(crate) fn new(
        id: usize,
        ctx: Arc<WorkerContext>,
        tasks: Receiver<TaskDescriptor>,
        results: Sender<WorkerMessage>,
    ) -> Self {
        Self {
            id,
            ctx,
            tasks,
            results,
        }
    }

    /// Run until the task queue is empty or the loader is closed
    pub(crate) fn run(self) {
        tracing::debug!("Batch reader {} started", self.id);
        let mut processed = 0usize;

        while !self.ctx.cancelled() {
            // The queue is filled before readers start, so empty means done
            let Ok(task) = self.tasks.try_recv() else {
                break;
            };

            let outcome = match self.ctx.process(&task) {
                Err(BatchFailure::Fetch(FetchError::Cancelled)) => break,
                other => other,
            };
            if self.ctx.cancelled() {
                break;
            }
            let message = WorkerMessage::Batch {
                index: task.batch_index,
                outcome,
            };
            if self.results.send(message).is_err() {
                // Loader released the result queue
                tracing::debug!("Batch reader {} lost its consumer", self.id);
                return;
            }
            processed += 1;
        }

        let _ = self.results.send(WorkerMessage::Done { worker: self.id });
        tracing::debug!(
            "Batch reader {} stopped after {} batches",
            self.id,
            processed
        );
    }
}
