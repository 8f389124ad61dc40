use std::time::Duration;

use futures::Future;
use tracing::warn;

use crate::{error::ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub base_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay: Duration::from_secs(2),
    }
  }
}

impl RetryPolicy {
  /// Delay before the given retry (1-based), doubling each time.
  pub fn backoff(&self, retry: u32) -> Duration {
    let factor = 2u32.saturating_pow(retry.saturating_sub(1));
    self.base_delay.saturating_mul(factor)
  }

  // Only transient failures are retried; auth and fatal errors are
  // returned on the first occurrence.
  pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let mut attempt = 1;
    loop {
      match op().await {
        Ok(v) => return Ok(v),
        Err(e)
          if e.kind() == ErrorKind::Transient
            && attempt < self.max_attempts =>
        {
          let delay = self.backoff(attempt);
          warn!(
            %what,
            attempt,
            ?delay,
            error = %e,
            "transient failure, retrying"
          );
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(e) => return Err(e),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicU32, Ordering};

  use super::*;
  use crate::Error;

  fn fast() -> RetryPolicy {
    RetryPolicy {
      max_attempts: 3,
      base_delay: Duration::from_millis(1),
    }
  }

  #[test]
  fn test_backoff_doubles() {
    let policy = RetryPolicy {
      max_attempts: 5,
      base_delay: Duration::from_millis(100),
    };
    assert_eq!(policy.backoff(1), Duration::from_millis(100));
    assert_eq!(policy.backoff(2), Duration::from_millis(200));
    assert_eq!(policy.backoff(3), Duration::from_millis(400));
  }

  #[tokio::test]
  async fn test_retries_transient_until_success() {
    let calls = &AtomicU32::new(0);
    let res = fast()
      .run("op", move || async move {
        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
          Err(Error::Transient("503".into()))
        } else {
          Ok(7)
        }
      })
      .await;

    assert_eq!(res.unwrap(), 7);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_gives_up_after_max_attempts() {
    let calls = &AtomicU32::new(0);
    let res: Result<()> = fast()
      .run("op", move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::Transient("503".into()))
      })
      .await;

    assert!(matches!(res, Err(Error::Transient(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_auth_errors_are_not_retried() {
    let calls = &AtomicU32::new(0);
    let res: Result<()> = fast()
      .run("op", move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::AuthRequired("login".into()))
      })
      .await;

    assert!(matches!(res, Err(Error::AuthRequired(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }
}
