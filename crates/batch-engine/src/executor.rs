/// The opaque, blocking, shape-preserving backend that turns a batch of `N`
/// inputs into `N` results. Implementations are expected to block the
/// calling thread (they are always invoked from inside `spawn_blocking`) and
/// must preserve positional ordering: `run(inputs)[i]` corresponds to
/// `inputs[i]`.
///
/// `run` is synchronous and `Send + Sync` rather than `async_trait` because
/// the contract is explicitly blocking — see `WorkerPool`.
pub trait BatchExecutor<I, O>: Send + Sync + 'static {
    /// Execute a batch. Returning a `Vec` whose length does not match
    /// `inputs.len()` is treated as an executor failure by the `WorkerPool`.
    fn run(&self, inputs: &[I]) -> Result<Vec<O>, String>;
}

/// Deterministic stand-in for a real numerical model, used by the
/// inference binary's default configuration and by the test suite. Produces
/// a fixed-width embedding derived from a cheap hash of the input text, with
/// optional artificial latency and an injectable failure mode so tests can
/// exercise the `inference_failed` path without a real backend.
pub struct MockExecutor {
    pub dims: usize,
    pub artificial_latency: std::time::Duration,
    pub fail: std::sync::atomic::AtomicBool,
}

impl MockExecutor {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            artificial_latency: std::time::Duration::ZERO,
            fail: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn with_latency(mut self, latency: std::time::Duration) -> Self {
        self.artificial_latency = latency;
        self
    }

    /// Test hook: force the next `run` call to fail.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut state: u64 = 0xcbf29ce484222325;
        for byte in text.bytes() {
            state ^= byte as u64;
            state = state.wrapping_mul(0x100000001b3);
        }
        (0..self.dims)
            .map(|i| {
                let mixed = state.wrapping_add(i as u64).wrapping_mul(0x2545F4914F6CDD1D);
                ((mixed >> 40) as i32 as f32) / (i32::MAX as f32)
            })
            .collect()
    }
}

impl BatchExecutor<String, Vec<f32>> for MockExecutor {
    fn run(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, String> {
        if self.fail.swap(false, std::sync::atomic::Ordering::SeqCst) {
            return Err("mock executor injected failure".to_owned());
        }
        if !self.artificial_latency.is_zero() {
            std::thread::sleep(self.artificial_latency);
        }
        Ok(inputs.iter().map(|text| self.embed_one(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_executor_preserves_order_and_shape() {
        let exec = MockExecutor::new(4);
        let inputs = vec!["a".to_owned(), "b".to_owned(), "a".to_owned()];
        let out = exec.run(&inputs).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], out[2], "same input must embed identically");
        assert_ne!(out[0], out[1]);
    }

    #[test]
    fn mock_executor_injected_failure_is_one_shot() {
        let exec = MockExecutor::new(2);
        exec.set_failing(true);
        assert!(exec.run(&["x".to_owned()]).is_err());
        assert!(exec.run(&["x".to_owned()]).is_ok());
    }
}
