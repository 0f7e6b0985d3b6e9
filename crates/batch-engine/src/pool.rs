use std::sync::Arc;

use metrics::{GaugeGuard, InferenceMetrics};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{error, warn};

use crate::batch::PendingBatch;
use crate::error::BatchError;
use crate::executor::BatchExecutor;

/// Owns `num_workers` executor slots, each an exclusive handle to the
/// `BatchExecutor` running on the Tokio blocking pool (never the cooperative
/// scheduler, since the executor is blocking by contract).
///
/// The pool makes no ordering guarantee across batches — two batches
/// submitted in order may finish out of order — but within a batch,
/// `output[i]` always corresponds to `input[i]`.
pub struct WorkerPool<I, O> {
    tx: mpsc::Sender<PendingBatch<I, O>>,
}

impl<I, O> WorkerPool<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Spawn `num_workers` worker tasks sharing one bounded intake of
    /// capacity `num_workers`. A full intake briefly parks the submitting
    /// collector — the deliberate backpressure that caps in-flight batches.
    pub fn spawn(
        num_workers: usize,
        executor: Arc<dyn BatchExecutor<I, O>>,
        metrics: Arc<InferenceMetrics>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(num_workers);
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..num_workers {
            let rx = rx.clone();
            let executor = executor.clone();
            let metrics = metrics.clone();
            metrics::spawn_monitored("worker-pool-slot", async move {
                Self::run_worker(worker_id, rx, executor, metrics).await;
            });
        }

        Self { tx }
    }

    /// Submit a closed batch. Blocks briefly if every worker slot is busy.
    pub async fn submit(&self, batch: PendingBatch<I, O>) -> Result<(), BatchError> {
        self.tx
            .send(batch)
            .await
            .map_err(|_| BatchError::Internal("worker pool intake is closed".to_owned()))
    }

    async fn run_worker(
        worker_id: usize,
        rx: Arc<Mutex<mpsc::Receiver<PendingBatch<I, O>>>>,
        executor: Arc<dyn BatchExecutor<I, O>>,
        metrics: Arc<InferenceMetrics>,
    ) {
        loop {
            let batch = {
                let mut rx = rx.lock().await;
                match rx.recv().await {
                    Some(batch) => batch,
                    None => return,
                }
            };

            let _inflight = GaugeGuard::acquire(&metrics.inflight_batches);
            let batch_size = batch.len();
            let (inputs, handles) = batch.into_parts();

            let exec = executor.clone();
            let inference_start = Instant::now();
            let result = tokio::task::spawn_blocking(move || exec.run(&inputs)).await;
            let inference_time = inference_start.elapsed();

            metrics.inference_time.observe(inference_time.as_secs_f64());
            metrics.batch_size.observe(batch_size as f64);

            match result {
                Ok(Ok(outputs)) if outputs.len() == handles.len() => {
                    metrics
                        .batches_processed_total
                        .with_label_values(&["success"])
                        .inc();
                    for (handle, output) in handles.into_iter().zip(outputs) {
                        handle.resolve(Ok(output));
                    }
                }
                Ok(Ok(outputs)) => {
                    error!(
                        worker_id,
                        expected = handles.len(),
                        actual = outputs.len(),
                        "executor output length did not match input length"
                    );
                    metrics
                        .batches_processed_total
                        .with_label_values(&["shape_mismatch"])
                        .inc();
                    for handle in handles {
                        handle.resolve(Err(BatchError::InferenceFailed(
                            "output length did not match input length".to_owned(),
                        )));
                    }
                }
                Ok(Err(reason)) => {
                    warn!(worker_id, error = %reason, "executor reported failure for batch");
                    metrics
                        .batches_processed_total
                        .with_label_values(&["error"])
                        .inc();
                    for handle in handles {
                        handle.resolve(Err(BatchError::InferenceFailed(reason.clone())));
                    }
                }
                Err(join_err) => {
                    error!(worker_id, error = %join_err, "executor task panicked");
                    metrics
                        .batches_processed_total
                        .with_label_values(&["panic"])
                        .inc();
                    for handle in handles {
                        handle.resolve(Err(BatchError::InferenceFailed(
                            "executor panicked".to_owned(),
                        )));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::PendingItem;
    use prometheus::Registry;
    use tokio_util::sync::CancellationToken;

    struct EchoExecutor;
    impl BatchExecutor<u32, u32> for EchoExecutor {
        fn run(&self, inputs: &[u32]) -> Result<Vec<u32>, String> {
            Ok(inputs.iter().map(|n| n * 2).collect())
        }
    }

    struct MismatchExecutor;
    impl BatchExecutor<u32, u32> for MismatchExecutor {
        fn run(&self, inputs: &[u32]) -> Result<Vec<u32>, String> {
            Ok(inputs.iter().take(inputs.len().saturating_sub(1)).copied().collect())
        }
    }

    #[tokio::test]
    async fn resolves_each_item_by_position() {
        let metrics = Arc::new(InferenceMetrics::new(Registry::new()));
        let pool = WorkerPool::spawn(2, Arc::new(EchoExecutor), metrics);

        let (item_a, rx_a) = PendingItem::new(1u32, CancellationToken::new());
        let (item_b, rx_b) = PendingItem::new(2u32, CancellationToken::new());
        let batch = PendingBatch::new(vec![item_a, item_b]);
        pool.submit(batch).await.unwrap();

        assert_eq!(rx_a.await.unwrap().unwrap(), 2);
        assert_eq!(rx_b.await.unwrap().unwrap(), 4);
    }

    #[tokio::test]
    async fn shape_mismatch_fails_every_item_in_batch() {
        let metrics = Arc::new(InferenceMetrics::new(Registry::new()));
        let pool = WorkerPool::spawn(1, Arc::new(MismatchExecutor), metrics);

        let (item_a, rx_a) = PendingItem::new(1u32, CancellationToken::new());
        let (item_b, rx_b) = PendingItem::new(2u32, CancellationToken::new());
        let batch = PendingBatch::new(vec![item_a, item_b]);
        pool.submit(batch).await.unwrap();

        assert!(rx_a.await.unwrap().is_err());
        assert!(rx_b.await.unwrap().is_err());
    }
}
