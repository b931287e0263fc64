//! Bounded-backoff retry for object-store calls.

use std::future::Future;
use std::time::Duration;

use crate::error::SweepError;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Run `op` up to `attempts` times with exponential backoff between
/// attempts, classifying the final failure as transient.
pub(crate) async fn retry_store<T, F, Fut>(
    operation: &'static str,
    attempts: u32,
    op: F,
) -> Result<T, SweepError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, object_store::Error>>,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(source) if attempt >= attempts => {
                return Err(SweepError::TransientStore {
                    operation,
                    attempts,
                    source,
                });
            }
            Err(error) => {
                tracing::warn!(
                    operation,
                    attempt,
                    error = %error,
                    "object store call failed, backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            }
        }
    }
}
