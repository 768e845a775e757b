// ABOUTME: Utility functions shared across the mirror engine
// ABOUTME: Provides retry logic and MySQL identifier quoting

use crate::config::RetryPolicy;
use anyhow::Result;

/// Retry an async operation with exponential backoff.
///
/// Executes the operation up to `policy.max_attempts` times, doubling the
/// delay between attempts. Returns the first success or the last error once
/// the budget is exhausted.
///
/// # Examples
///
/// ```
/// # use anyhow::Result;
/// # use table_mirror::config::RetryPolicy;
/// # use table_mirror::utils::retry_with_backoff;
/// # async fn example() -> Result<()> {
/// let value = retry_with_backoff(|| async { Ok(42) }, &RetryPolicy::default()).await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T>(mut operation: F, policy: &RetryPolicy) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = policy.initial_delay;
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                last_error = Some(e);

                if attempt < policy.max_attempts {
                    tracing::warn!(
                        "Operation failed (attempt {}/{}), retrying in {:?}...",
                        attempt,
                        policy.max_attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Operation failed after retries")))
}

/// Quote a MySQL identifier with backticks.
///
/// Embedded backticks are escaped by doubling, per MySQL quoting rules.
///
/// # Examples
///
/// ```
/// use table_mirror::utils::quote_ident;
/// assert_eq!(quote_ident("users"), "`users`");
/// assert_eq!(quote_ident("user`name"), "`user``name`");
/// ```
pub fn quote_ident(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn test_quote_ident_plain() {
        assert_eq!(quote_ident("orders"), "`orders`");
    }

    #[test]
    fn test_quote_ident_escapes_backticks() {
        assert_eq!(quote_ident("a`b"), "`a``b`");
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
        };

        let result = retry_with_backoff(
            || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    anyhow::bail!("transient failure")
                }
                Ok(n)
            },
            &policy,
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_budget() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
        };

        let result: Result<()> = retry_with_backoff(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("always fails")
            },
            &policy,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
