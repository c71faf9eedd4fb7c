use std::{future::Future, time::Duration};
use tokio::time;

/// Resolves to the future's output, or to `fallback` once `limit` elapses.
/// The slow future is dropped on expiry and its eventual result discarded.
pub async fn with_deadline<F, T>(label: &'static str, limit: Duration, fallback: T, fut: F) -> T
where
    F: Future<Output = T>,
{
    match time::timeout(limit, fut).await {
        Ok(value) => value,
        Err(_) => {
            tracing::debug!(source = label, timeout_ms = limit.as_millis() as u64, "deadline expired, using fallback");
            fallback
        }
    }
}
