//! Retry wrapper for transport calls.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::timing::sleep_cancellable;
use super::transport::TransportError;

/// Pause between two attempts of the same request.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Invoke `op` up to `retries` times until it succeeds.
///
/// Attempts are separated by `backoff`. Cancellation stops the loop before the
/// next attempt; the last transport error is returned in that case, or
/// [`TransportError::Cancelled`] when no attempt was made.
pub async fn with_retries<T, F, Fut>(
    retries: u32,
    cancel: &CancellationToken,
    backoff: Duration,
    mut op: F,
) -> Result<T, TransportError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let mut last_error = None;

    for attempt in 0..retries {
        if cancel.is_cancelled() {
            break;
        }

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                log::debug!("attempt {}/{} failed: {}", attempt + 1, retries, err);
                last_error = Some(err);
            }
        }

        if attempt + 1 < retries && !sleep_cancellable(backoff, cancel).await {
            break;
        }
    }

    Err(match last_error {
        Some(err) => err,
        None if retries == 0 => TransportError::NoAttempts { retries },
        None => TransportError::Cancelled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    const FAST: Duration = Duration::from_millis(1);

    async fn flaky(calls: &AtomicU32, succeed_on: u32) -> Result<u32, TransportError> {
        let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt >= succeed_on {
            Ok(attempt)
        } else {
            Err(TransportError::Transport(format!("failure #{attempt}")))
        }
    }

    #[tokio::test]
    async fn succeeds_on_kth_attempt() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result = with_retries(3, &cancel, FAST, |_| flaky(&calls, 3)).await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_last_error_after_all_attempts() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result = with_retries(3, &cancel, FAST, |_| flaky(&calls, 10)).await;
        assert_eq!(result, Err(TransportError::Transport("failure #3".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_retries_is_a_generic_error() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result = with_retries(0, &cancel, FAST, |_| flaky(&calls, 1)).await;
        assert_eq!(result, Err(TransportError::NoAttempts { retries: 0 }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_attempt() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result = with_retries(5, &cancel, Duration::from_secs(30), |attempt| {
            if attempt == 1 {
                cancel.cancel();
            }
            flaky(&calls, 10)
        })
        .await;

        assert_eq!(result, Err(TransportError::Transport("failure #2".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
