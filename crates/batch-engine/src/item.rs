use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::BatchError;

/// One in-flight prediction request inside the batching engine.
///
/// The completion handle is a `tokio::sync::oneshot` pair: exactly one
/// producer resolves it (the `WorkerPool`, or a collector on cancellation /
/// overload), and exactly one consumer (the ingress task) awaits it. Once
/// resolved, `enqueue_time` is no longer read by anyone.
pub struct PendingItem<I, O> {
    pub input: I,
    pub enqueue_time: Instant,
    pub cancel_signal: CancellationToken,
    response_tx: oneshot::Sender<Result<O, BatchError>>,
}

/// The non-input half of a `PendingItem`, produced by `PendingBatch::into_parts`
/// so the `WorkerPool` can hand the bare inputs to the executor without
/// requiring `I: Clone`.
pub struct CompletionHandle<O> {
    pub enqueue_time: Instant,
    pub cancel_signal: CancellationToken,
    response_tx: oneshot::Sender<Result<O, BatchError>>,
}

impl<I, O> PendingItem<I, O> {
    pub fn new(input: I, cancel_signal: CancellationToken) -> (Self, oneshot::Receiver<Result<O, BatchError>>) {
        let (response_tx, response_rx) = oneshot::channel();
        let item = Self {
            input,
            enqueue_time: Instant::now(),
            cancel_signal,
            response_tx,
        };
        (item, response_rx)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_signal.is_cancelled()
    }

    /// Resolve this item's completion, consuming it so it cannot be resolved
    /// twice. Used for terminal states reached before the item enters a batch
    /// (validation failure, queue overload, pre-batch cancellation).
    pub fn resolve(self, result: Result<O, BatchError>) {
        // The ingress task may have already given up (deadline elapsed); a
        // dropped receiver is not an error here.
        let _ = self.response_tx.send(result);
    }

    pub(crate) fn into_handle(self) -> (I, CompletionHandle<O>) {
        (
            self.input,
            CompletionHandle {
                enqueue_time: self.enqueue_time,
                cancel_signal: self.cancel_signal,
                response_tx: self.response_tx,
            },
        )
    }
}

impl<O> CompletionHandle<O> {
    pub fn resolve(self, result: Result<O, BatchError>) {
        let _ = self.response_tx.send(result);
    }
}
