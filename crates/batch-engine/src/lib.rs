//! Dynamic batching engine: groups independently-arriving requests into
//! size/time-bounded batches and runs them through a pool of blocking
//! executor slots, without any request waiting on an unrelated one beyond
//! its own batch.

mod batch;
mod collector;
mod config;
mod engine;
mod error;
mod executor;
mod item;
mod pool;
mod queue;

pub use batch::PendingBatch;
pub use config::BatcherConfig;
pub use engine::BatchingEngine;
pub use error::BatchError;
pub use executor::{BatchExecutor, MockExecutor};
pub use item::{CompletionHandle, PendingItem};
pub use queue::BatchQueue;
