use std::sync::Arc;

use metrics::InferenceMetrics;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::collector::BatchCollector;
use crate::config::BatcherConfig;
use crate::error::BatchError;
use crate::executor::BatchExecutor;
use crate::item::PendingItem;
use crate::pool::WorkerPool;
use crate::queue::BatchQueue;

/// Wires a `BatchQueue`, `config.num_collectors` `BatchCollector`s, and a
/// `WorkerPool` of `config.num_workers` executor slots into the single
/// entry point an `IngressAdapter` needs: `submit`.
///
/// Construction spawns every collector and worker task; there is no
/// separate `start`. Dropping the last `Arc` to the queue's sender side
/// (which happens once every clone of this `BatchingEngine` is dropped)
/// lets collectors observe a closed queue and exit.
pub struct BatchingEngine<I, O> {
    queue: Arc<BatchQueue<I, O>>,
    config: BatcherConfig,
}

impl<I, O> Clone for BatchingEngine<I, O> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            config: self.config.clone(),
        }
    }
}

impl<I, O> BatchingEngine<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn new(
        config: BatcherConfig,
        executor: Arc<dyn BatchExecutor<I, O>>,
        metrics: Arc<InferenceMetrics>,
    ) -> Result<Self, String> {
        config.validate()?;

        let queue = Arc::new(BatchQueue::new(config.queue_capacity, metrics.queue_size.clone()));
        let pool = Arc::new(WorkerPool::spawn(config.num_workers, executor, metrics.clone()));
        BatchCollector::spawn_all(queue.clone(), pool, config.clone(), metrics);

        Ok(Self { queue, config })
    }

    /// Enqueue `input` and await its result, subject to `deadline` for
    /// admission and `cancel_signal` for the caller giving up mid-flight.
    /// Admission (`BatchQueue::offer`) and completion are two independent
    /// waits: a request can be admitted and then still be cut off by its
    /// own deadline while sitting inside an open batch, which the ingress
    /// adapter is expected to race against this future with its own timeout.
    pub async fn submit(
        &self,
        input: I,
        deadline: Instant,
        cancel_signal: CancellationToken,
    ) -> Result<O, BatchError> {
        let (item, completion) = PendingItem::new(input, cancel_signal);
        self.queue.offer(item, deadline).await?;
        completion
            .await
            .map_err(|_| BatchError::Internal("completion sender dropped without resolving".to_owned()))?
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.config
    }
}
