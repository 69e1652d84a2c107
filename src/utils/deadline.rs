//! Call-scoped timeouts and cancellation for remote calls.

use crate::types::{AppError, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Run `fut` until it finishes, `timeout` elapses or `cancel` fires.
///
/// A timeout is reported through `on_timeout`, so each stage can surface
/// its own error kind. Cancellation always yields [`AppError::Cancelled`].
pub async fn with_deadline<T, Fut>(
    fut: Fut,
    timeout: Duration,
    cancel: &CancellationToken,
    on_timeout: fn(Duration) -> AppError,
) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        outcome = tokio::time::timeout(timeout, fut) => match outcome {
            Ok(result) => result,
            Err(_) => Err(on_timeout(timeout)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let value = with_deadline(
            async { Ok(5) },
            Duration::from_secs(1),
            &CancellationToken::new(),
            AppError::EmbeddingTimeout,
        )
        .await
        .unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn test_timeout_uses_stage_error() {
        let result: Result<()> = with_deadline(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            Duration::from_millis(10),
            &CancellationToken::new(),
            AppError::SynthesisTimeout,
        )
        .await;

        assert!(matches!(result, Err(AppError::SynthesisTimeout(d)) if d == Duration::from_millis(10)));
    }

    #[tokio::test]
    async fn test_cancelled_token_wins() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<()> = with_deadline(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            Duration::from_secs(10),
            &cancel,
            AppError::EmbeddingTimeout,
        )
        .await;

        assert!(matches!(result, Err(AppError::Cancelled)));
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let result: Result<()> = with_deadline(
            async { Err(AppError::InvalidQuery("empty".into())) },
            Duration::from_secs(1),
            &CancellationToken::new(),
            AppError::EmbeddingTimeout,
        )
        .await;

        assert!(matches!(result, Err(AppError::InvalidQuery(_))));
    }
}
