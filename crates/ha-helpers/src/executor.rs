//! Running blocking work off the async runtime

use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("executor job panicked")]
    Panicked,

    #[error("executor job was cancelled")]
    Cancelled,
}

/// Run a blocking closure on tokio's blocking thread pool
pub async fn run_blocking<F, T>(job: F) -> Result<T, ExecutorError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job).await.map_err(|err| {
        if err.is_panic() {
            error!("Executor job panicked: {}", err);
            ExecutorError::Panicked
        } else {
            ExecutorError::Cancelled
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runs_job_and_returns_value() {
        let value = run_blocking(|| {
            std::thread::sleep(std::time::Duration::from_millis(5));
            21 * 2
        })
        .await
        .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_panicking_job_is_reported() {
        let result: Result<(), _> = run_blocking(|| panic!("boom")).await;
        assert!(matches!(result, Err(ExecutorError::Panicked)));
    }
}
