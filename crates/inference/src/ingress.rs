use std::sync::Arc;
use std::time::Duration;

use batch_engine::BatchingEngine;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::ApiError;

pub const MAX_INPUT_CODEPOINTS: usize = 1024;

fn validate(input_text: &str) -> Result<String, ApiError> {
    let trimmed = input_text.trim();
    if trimmed.is_empty() {
        return Err(ApiError::Validation("input_text must not be empty".to_owned()));
    }
    if trimmed.chars().count() > MAX_INPUT_CODEPOINTS {
        return Err(ApiError::Validation(format!(
            "input_text exceeds {MAX_INPUT_CODEPOINTS} codepoints"
        )));
    }
    Ok(trimmed.to_owned())
}

/// Turns one HTTP request into a `PendingItem`, offers it to the
/// `BatchingEngine`, and races the engine's completion against the
/// request's own deadline — on expiry the task stops waiting and reports
/// `DeadlineExceeded` regardless of whether the batch eventually finishes.
pub async fn handle_embed(
    engine: &BatchingEngine<String, Vec<f32>>,
    input_text: &str,
    request_deadline: Duration,
    correlation_id: uuid::Uuid,
) -> Result<Vec<f32>, ApiError> {
    let validated = validate(input_text)?;
    let cancel = CancellationToken::new();
    let deadline = tokio::time::Instant::now() + request_deadline;

    let span = tracing::info_span!("embed_request", %correlation_id);
    async {
        tokio::select! {
            result = engine.submit(validated, deadline, cancel.clone()) => {
                result.map_err(ApiError::from)
            }
            _ = tokio::time::sleep(request_deadline) => {
                cancel.cancel();
                Err(ApiError::DeadlineExceeded)
            }
        }
    }
    .instrument(span)
    .await
}

pub type SharedEngine = Arc<BatchingEngine<String, Vec<f32>>>;

#[cfg(test)]
mod tests {
    use super::*;
    use batch_engine::{BatchExecutor, BatcherConfig};
    use metrics::InferenceMetrics;
    use prometheus::Registry;

    struct EchoExecutor;
    impl BatchExecutor<String, Vec<f32>> for EchoExecutor {
        fn run(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, String> {
            Ok(inputs.iter().map(|s| vec![s.len() as f32]).collect())
        }
    }

    fn engine() -> BatchingEngine<String, Vec<f32>> {
        let metrics = Arc::new(InferenceMetrics::new(Registry::new()));
        let config = BatcherConfig {
            max_batch_size: 4,
            batch_timeout: Duration::from_millis(10),
            num_collectors: 1,
            num_workers: 1,
            queue_capacity: 16,
        };
        BatchingEngine::new(config, Arc::new(EchoExecutor), metrics).unwrap()
    }

    #[tokio::test]
    async fn rejects_empty_input() {
        let engine = engine();
        let err = handle_embed(&engine, "   ", Duration::from_millis(500), uuid::Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_oversized_input() {
        let engine = engine();
        let text = "a".repeat(MAX_INPUT_CODEPOINTS + 1);
        let err = handle_embed(&engine, &text, Duration::from_millis(500), uuid::Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn successful_embed_round_trips() {
        let engine = engine();
        let result = handle_embed(&engine, "hello", Duration::from_millis(500), uuid::Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(result, vec![5.0]);
    }
}
