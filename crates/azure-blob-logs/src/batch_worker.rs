// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Queue that drains log lines into the append blob, one batch at a time.
//!
//! Producers hold a cloneable [`BatchWorkerHandle`] and push lines without
//! waiting. A single [`BatchWorker`] task owns the drain: it takes everything
//! queued so far as one batch, appends it chunk by chunk, completes the
//! batch's receipts and only then looks at the queue again. Lines that arrive
//! while a batch is in flight make up the next one.
//!
//! ```text
//!   handles ──► unbounded channel ──► worker task ──► store.append (sequential)
//!                                          │
//!                                          └─► identity.roll() on block ceiling
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::blob_identity::BlobIdentity;
use crate::chunk;
use crate::retry::RetryPolicy;
use crate::store::RemoteAppendStore;

#[derive(Debug)]
pub struct PendingEntry {
    line: String,
    done: oneshot::Sender<()>,
}

#[derive(Debug)]
pub enum WorkerCommand {
    Enqueue(PendingEntry),
    /// Answered once every entry queued before it has been processed.
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Resolves once the batch holding the line has been processed, whether or
/// not its chunks reached the store. Dropping it is fine.
#[derive(Debug)]
pub struct LogReceipt {
    rx: oneshot::Receiver<()>,
}

impl Future for LogReceipt {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // a closed sender means the worker is gone; nothing left to wait for
        Pin::new(&mut self.rx).poll(cx).map(|_| ())
    }
}

#[derive(Clone, Debug)]
pub struct BatchWorkerHandle {
    tx: mpsc::UnboundedSender<WorkerCommand>,
}

impl BatchWorkerHandle {
    /// Queues one formatted line. Never blocks.
    ///
    /// If the worker has stopped the line is dropped and the receipt resolves
    /// immediately.
    pub fn enqueue(&self, line: String) -> LogReceipt {
        let (done, rx) = oneshot::channel();
        if self
            .tx
            .send(WorkerCommand::Enqueue(PendingEntry { line, done }))
            .is_err()
        {
            error!("BLOB | Batch worker stopped, dropping log line");
        }
        LogReceipt { rx }
    }

    pub async fn flush(&self) -> Result<(), String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(WorkerCommand::Flush(response_tx))
            .map_err(|e| format!("Failed to send flush command: {e}"))?;

        response_rx
            .await
            .map_err(|e| format!("Failed to receive flush response: {e}"))
    }

    /// Stops the worker after the lines already queued have been processed.
    pub fn shutdown(&self) -> Result<(), mpsc::error::SendError<WorkerCommand>> {
        self.tx.send(WorkerCommand::Shutdown)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct BatchWorkerConfig {
    pub store: Arc<dyn RemoteAppendStore>,
    pub identity: Arc<BlobIdentity>,
    pub container: String,
    pub max_append_size: usize,
    pub max_block_count: u64,
}

pub struct BatchWorker {
    store: Arc<dyn RemoteAppendStore>,
    identity: Arc<BlobIdentity>,
    retry: RetryPolicy,
    container: String,
    max_append_size: usize,
    max_block_count: u64,
    rx: mpsc::UnboundedReceiver<WorkerCommand>,
}

impl BatchWorker {
    /// Returns the worker (to be spawned) and a handle (to send lines).
    #[must_use]
    pub fn new(config: BatchWorkerConfig) -> (Self, BatchWorkerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Self {
            retry: RetryPolicy::new(Arc::clone(&config.store), config.container.clone()),
            store: config.store,
            identity: config.identity,
            container: config.container,
            max_append_size: config.max_append_size,
            max_block_count: config.max_block_count,
            rx,
        };
        (worker, BatchWorkerHandle { tx })
    }

    /// Processes commands until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        debug!("BLOB | Batch worker started");

        while let Some(first) = self.rx.recv().await {
            let mut batch = Vec::new();
            let mut control = None;

            // take whatever is queued right now; later lines wait for the next batch
            let mut next = Some(first);
            while let Some(command) = next.take() {
                match command {
                    WorkerCommand::Enqueue(entry) => batch.push(entry),
                    other => {
                        control = Some(other);
                        break;
                    }
                }
                next = self.rx.try_recv().ok();
            }

            if !batch.is_empty() {
                self.process_batch(batch).await;
            }

            match control {
                Some(WorkerCommand::Flush(response_tx)) => {
                    if response_tx.send(()).is_err() {
                        error!("BLOB | Failed to send flush response - receiver dropped");
                    }
                }
                Some(WorkerCommand::Shutdown) => {
                    debug!("BLOB | Batch worker shutting down");
                    self.discard_remaining();
                    break;
                }
                Some(WorkerCommand::Enqueue(_)) | None => {}
            }
        }

        debug!("BLOB | Batch worker stopped");
    }

    /// Empties the queue after shutdown. Receipts of dropped lines resolve as
    /// their senders go out of scope.
    fn discard_remaining(&mut self) {
        self.rx.close();
        let mut dropped = 0usize;
        while let Ok(command) = self.rx.try_recv() {
            match command {
                WorkerCommand::Enqueue(_) => dropped += 1,
                // dropping the responder fails the pending flush
                WorkerCommand::Flush(_) | WorkerCommand::Shutdown => {}
            }
        }
        if dropped > 0 {
            warn!("BLOB | Dropped {} line(s) queued after shutdown", dropped);
        }
    }

    async fn process_batch(&self, batch: Vec<PendingEntry>) {
        debug!("BLOB | Draining {} line(s)", batch.len());

        let payload: String = batch.iter().map(|entry| entry.line.as_str()).collect();
        let chunks = chunk::split(&payload, self.max_append_size);
        debug!(
            "BLOB | Appending {} byte(s) in {} chunk(s)",
            payload.len(),
            chunks.len()
        );

        for chunk in chunks {
            self.append_chunk(chunk).await;
        }

        for entry in batch {
            // the producer may have dropped its receipt
            let _ = entry.done.send(());
        }
        debug!("BLOB | Finished appending batch");
    }

    async fn append_chunk(&self, chunk: &str) {
        let name = self.identity.current();
        match self.store.append(&self.container, &name, chunk).await {
            Ok(outcome) => {
                if outcome.committed_block_count >= self.max_block_count {
                    debug!(
                        "BLOB | {} reached {} committed blocks",
                        name, outcome.committed_block_count
                    );
                    self.identity.roll();
                }
            }
            Err(err) => {
                self.retry.recover(&err, chunk, &name).await;
            }
        }
    }
}
