//! Bounded calls into external collaborators.

use std::future::Future;
use std::time::Duration;

/// Await `future` for at most `limit`, mapping an elapsed deadline through `on_timeout`.
pub async fn bounded<T, E, F>(
    limit: Duration,
    future: F,
    on_timeout: impl FnOnce(Duration) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(limit)),
    }
}
