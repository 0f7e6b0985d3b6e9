use std::time::Duration;

/// Immutable configuration for a `BatchingEngine`. Validated once at
/// construction time; nothing downstream re-reads it afterwards.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Maximum number of items in a single dispatched batch.
    pub max_batch_size: usize,
    /// Maximum time from the first item's arrival to batch closure.
    pub batch_timeout: Duration,
    /// Number of concurrent `BatchCollector` tasks draining the queue.
    pub num_collectors: usize,
    /// Number of blocking executor slots in the `WorkerPool`.
    pub num_workers: usize,
    /// Capacity of the `BatchQueue`; must be at least `max_batch_size`.
    pub queue_capacity: usize,
}

impl BatcherConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_batch_size == 0 {
            return Err("max_batch_size must be >= 1".to_owned());
        }
        if self.batch_timeout.is_zero() {
            return Err("batch_timeout must be > 0".to_owned());
        }
        if self.num_collectors == 0 {
            return Err("num_collectors must be >= 1".to_owned());
        }
        if self.num_workers == 0 {
            return Err("num_workers must be >= 1".to_owned());
        }
        if self.queue_capacity < self.max_batch_size {
            return Err("queue_capacity must be >= max_batch_size".to_owned());
        }
        Ok(())
    }
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 32,
            batch_timeout: Duration::from_millis(10),
            num_collectors: 2,
            num_workers: 2,
            queue_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_queue_capacity_below_batch_size() {
        let cfg = BatcherConfig {
            max_batch_size: 16,
            queue_capacity: 8,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_config_validates() {
        assert!(BatcherConfig::default().validate().is_ok());
    }
}
