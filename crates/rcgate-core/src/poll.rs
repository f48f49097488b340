//! Bounded polling.

use std::future::Future;
use std::time::Duration;

/// Call `check` up to `attempts` times, sleeping `delay` between attempts,
/// until it yields `Some`.
///
/// Returns `None` once the budget is spent.
pub async fn poll_until<T, F, Fut>(attempts: u32, delay: Duration, mut check: F) -> Option<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for attempt in 1..=attempts {
        if attempt > 1 {
            tokio::time::sleep(delay).await;
        }
        if let Some(value) = check(attempt).await {
            return Some(value);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stops_at_first_success() {
        let result = poll_until(5, Duration::from_millis(1), |attempt| async move {
            (attempt == 3).then_some(attempt)
        })
        .await;
        assert_eq!(result, Some(3));
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let mut calls = 0;
        let result: Option<()> = poll_until(4, Duration::from_millis(1), |_| {
            calls += 1;
            async { None }
        })
        .await;
        assert!(result.is_none());
        assert_eq!(calls, 4);
    }

    #[tokio::test]
    async fn first_attempt_does_not_wait() {
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            poll_until(3, Duration::from_secs(30), |attempt| async move { Some(attempt) }),
        )
        .await;
        assert_eq!(result.ok().flatten(), Some(1));
    }
}
