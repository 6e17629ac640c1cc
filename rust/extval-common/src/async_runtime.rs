//! Task spawning on the async runtime.
//!
//! Refresh loops run as tasks, parsing and encoding go to the blocking pool.
//! Only tokio is supported for now.

pub use impls::{JoinHandle, spawn, spawn_blocking};

use crate::{Result, error::Error};

/// Runs `f` on the blocking pool and waits for its result.
///
/// A task that panicked or was cancelled is reported as a `Task` error
/// mentioning `context`.
pub async fn run_blocking<F, T>(context: &str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(f)
        .await
        .map_err(|e| Error::task(context, e))?
}

#[cfg(feature = "tokio")]
mod impls {
    use std::future::Future;

    pub type JoinHandle<T> = tokio::task::JoinHandle<T>;

    pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::task::spawn(future)
    }

    pub fn spawn_blocking<F, R>(f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        tokio::task::spawn_blocking(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_run_blocking_result() {
        assert_eq!(42, run_blocking("answer", || Ok(42)).await.unwrap());

        let err = run_blocking::<_, ()>("invalid", || Err(Error::invalid_format("blob")))
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidFormat { .. }));
    }

    #[tokio::test]
    async fn test_run_blocking_panic_is_task_error() {
        let err = run_blocking::<_, ()>("exploding", || panic!("boom"))
            .await
            .unwrap_err();
        match err.kind() {
            ErrorKind::Task { context, .. } => assert_eq!("exploding", context),
            other => panic!("unexpected error kind: {other}"),
        }
    }
}
