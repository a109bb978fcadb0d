//! Bounded external calls.

use std::future::Future;
use std::time::Duration;

use crate::error::{KernelError, Result};

/// Run `call` with a deadline, converting its error into a [`KernelError`].
pub(crate) async fn bounded<T, E, F>(limit: Duration, operation: &'static str, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    KernelError: From<E>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(KernelError::from),
        Err(_) => {
            tracing::warn!(operation, ?limit, "external call timed out");
            Err(KernelError::Timeout {
                operation,
                after: limit,
            })
        }
    }
}
