//! Timeout utilities shared by the fetcher and discoverer.
//!
//! Wraps an arbitrary async operation in `tokio::time::timeout`, producing
//! an error message that distinguishes a timeout from the operation's own
//! failure.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;

pub async fn with_timeout<F, T>(
    operation: F,
    timeout_secs: u64,
    operation_name: &str,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(Duration::from_secs(timeout_secs), operation).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "{operation_name} timeout after {timeout_secs} seconds"
        )),
    }
}
