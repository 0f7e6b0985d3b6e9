use std::sync::Arc;

use prometheus::IntGauge;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::time::Instant;

use crate::error::BatchError;
use crate::item::PendingItem;

/// Bounded multi-producer, multi-consumer hand-off channel of `PendingItem`s.
///
/// Capacity is enforced with a counting semaphore rather than relying on the
/// inner channel's own bound: `offer` needs to fail fast with `Overloaded`
/// once capacity is reached, not block the producer indefinitely, and a
/// semaphore permit acquired with a timeout gives exactly that without ever
/// taking ownership of the item until admission is certain.
pub struct BatchQueue<I, O> {
    tx: mpsc::UnboundedSender<(PendingItem<I, O>, tokio::sync::OwnedSemaphorePermit)>,
    rx: Mutex<mpsc::UnboundedReceiver<(PendingItem<I, O>, tokio::sync::OwnedSemaphorePermit)>>,
    capacity: Arc<Semaphore>,
    queue_size: IntGauge,
}

impl<I, O> BatchQueue<I, O> {
    pub fn new(capacity: usize, queue_size: IntGauge) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            capacity: Arc::new(Semaphore::new(capacity)),
            queue_size,
        }
    }

    /// Publish `item`, failing with `Overloaded` if no capacity is freed
    /// before `deadline`. On failure, resolves the item's completion itself
    /// (mirroring the ingress adapter's translation of `QueueFull`) so the
    /// caller does not need the item back.
    pub async fn offer(&self, item: PendingItem<I, O>, deadline: Instant) -> Result<(), BatchError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let permit = match tokio::time::timeout(remaining, self.capacity.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => {
                item.resolve(Err(BatchError::Overloaded));
                return Err(BatchError::Overloaded);
            }
        };

        if self.tx.send((item, permit)).is_err() {
            return Err(BatchError::Internal("batch queue is closed".to_owned()));
        }
        self.queue_size.inc();
        Ok(())
    }

    /// Take one item, or return `None` after `deadline` (or immediately if
    /// `deadline` is `None` and the queue never yields one — in practice
    /// collectors only ever call this without a deadline when opening a
    /// fresh batch, so it blocks until an item arrives).
    pub async fn take(&self, deadline: Option<Instant>) -> Option<PendingItem<I, O>> {
        let mut rx = self.rx.lock().await;
        let received = match deadline {
            None => rx.recv().await,
            Some(d) => {
                let remaining = d.saturating_duration_since(Instant::now());
                match tokio::time::timeout(remaining, rx.recv()).await {
                    Ok(v) => v,
                    Err(_) => None,
                }
            }
        };
        drop(rx);

        received.map(|(item, permit)| {
            drop(permit);
            self.queue_size.dec();
            item
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn gauge() -> IntGauge {
        IntGauge::new("t", "t").unwrap()
    }

    #[tokio::test]
    async fn offer_then_take_is_fifo() {
        let queue: BatchQueue<u32, u32> = BatchQueue::new(4, gauge());
        for n in 0..3u32 {
            let (item, _rx) = PendingItem::new(n, CancellationToken::new());
            queue.offer(item, Instant::now() + std::time::Duration::from_millis(50)).await.unwrap();
        }
        for expected in 0..3u32 {
            let item = queue.take(None).await.unwrap();
            assert_eq!(item.input, expected);
        }
    }

    #[tokio::test]
    async fn offer_fails_fast_when_full() {
        let queue: BatchQueue<u32, u32> = BatchQueue::new(1, gauge());
        let (item1, _rx1) = PendingItem::new(1, CancellationToken::new());
        queue.offer(item1, Instant::now() + std::time::Duration::from_millis(50)).await.unwrap();

        let (item2, rx2) = PendingItem::new(2, CancellationToken::new());
        let start = Instant::now();
        let result = queue.offer(item2, Instant::now() + std::time::Duration::from_millis(20)).await;
        assert!(result.is_err());
        assert!(start.elapsed() < std::time::Duration::from_millis(200));

        let resolved = rx2.await.unwrap();
        assert!(matches!(resolved, Err(BatchError::Overloaded)));
    }

    #[tokio::test]
    async fn take_times_out_when_empty() {
        let queue: BatchQueue<u32, u32> = BatchQueue::new(4, gauge());
        let result = queue
            .take(Some(Instant::now() + std::time::Duration::from_millis(10)))
            .await;
        assert!(result.is_none());
    }
}
