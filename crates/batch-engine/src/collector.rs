use std::sync::Arc;

use metrics::InferenceMetrics;
use tokio::time::Instant;
use tracing::error;

use crate::batch::PendingBatch;
use crate::config::BatcherConfig;
use crate::error::BatchError;
use crate::pool::WorkerPool;
use crate::queue::BatchQueue;

/// `num_collectors` identical cooperative tasks draining the `BatchQueue`
/// into size/time-bounded `PendingBatch`es and dispatching them to the
/// `WorkerPool`. This is the component that turns a stream of independent
/// requests into batches: the size cap bounds hardware occupancy per job,
/// the time cap bounds the head-of-line delay of the *first* item in a
/// batch. The clock starts on that first item's arrival, not on the
/// collector's own wakeup, so a lull followed by a single arrival still
/// produces a prompt single-item batch.
pub struct BatchCollector<I, O> {
    queue: Arc<BatchQueue<I, O>>,
    pool: Arc<WorkerPool<I, O>>,
    config: BatcherConfig,
    metrics: Arc<InferenceMetrics>,
}

impl<I, O> BatchCollector<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn spawn_all(
        queue: Arc<BatchQueue<I, O>>,
        pool: Arc<WorkerPool<I, O>>,
        config: BatcherConfig,
        metrics: Arc<InferenceMetrics>,
    ) {
        for collector_id in 0..config.num_collectors {
            let collector = Self {
                queue: queue.clone(),
                pool: pool.clone(),
                config: config.clone(),
                metrics: metrics.clone(),
            };
            metrics::spawn_monitored("batch-collector", async move {
                collector.run(collector_id).await
            });
        }
    }

    async fn run(&self, collector_id: usize) {
        loop {
            // Step 1: open a batch on the first item, with no deadline.
            let first = match self.queue.take(None).await {
                Some(item) => item,
                None => {
                    // BatchQueue has been torn down (shutdown); exit quietly.
                    return;
                }
            };
            if first.is_cancelled() {
                first.resolve(Err(BatchError::DeadlineExceeded));
                continue;
            }

            let batch_open_time = Instant::now();
            let mut buffer = vec![first];

            // Step 2: grow the batch until it's full or the clock runs out.
            while buffer.len() < self.config.max_batch_size {
                let elapsed = batch_open_time.elapsed();
                if elapsed >= self.config.batch_timeout {
                    break;
                }
                let remaining = self.config.batch_timeout - elapsed;
                let deadline = Instant::now() + remaining;

                match self.queue.take(Some(deadline)).await {
                    Some(item) if item.is_cancelled() => {
                        // Taken, but cancelled before entering a batch: record
                        // terminal state and keep growing. The caller is
                        // independently awaiting its own completion.
                        item.resolve(Err(BatchError::DeadlineExceeded));
                    }
                    Some(item) => buffer.push(item),
                    None => break,
                }
            }

            // Step 3: close and dispatch. Submission backpressure from a
            // saturated WorkerPool intake is deliberate and brief; once it
            // clears, this collector immediately loops back to step 1.
            let wait = batch_open_time.elapsed();
            self.metrics.batch_wait_time.observe(wait.as_secs_f64());

            let batch = PendingBatch::new(buffer);
            if let Err(err) = self.pool.submit(batch).await {
                error!(collector_id, error = %err, "failed to submit batch to worker pool");
            }
        }
    }
}
