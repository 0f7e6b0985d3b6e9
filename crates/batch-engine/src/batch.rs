use tokio::time::Instant;

use crate::item::{CompletionHandle, PendingItem};

/// A contiguous group of `PendingItem`s assembled by a single collector.
///
/// Invariant: `1 <= items.len() <= max_batch_size`; the order of `items`
/// matches the order items were drawn from the `BatchQueue`.
pub struct PendingBatch<I, O> {
    items: Vec<PendingItem<I, O>>,
    pub formed_at: Instant,
}

impl<I, O> PendingBatch<I, O> {
    pub fn new(items: Vec<PendingItem<I, O>>) -> Self {
        debug_assert!(!items.is_empty());
        Self {
            items,
            formed_at: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Split the batch into the bare inputs (in order, for the executor) and
    /// the completion handles (in the same order, for resolving results by
    /// positional index). Avoids requiring `I: Clone`.
    pub fn into_parts(self) -> (Vec<I>, Vec<CompletionHandle<O>>) {
        let mut inputs = Vec::with_capacity(self.items.len());
        let mut handles = Vec::with_capacity(self.items.len());
        for item in self.items {
            let (input, handle) = item.into_handle();
            inputs.push(input);
            handles.push(handle);
        }
        (inputs, handles)
    }
}
