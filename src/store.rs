//! Retrying access to the shared database.
//!
//! Every storage call goes through [`Store`]. Transient contention
//! (`database is locked`) is retried with exponential backoff; the whole
//! transaction is replayed, never a slice of it. Anything else propagates on
//! the first failure.

use std::future::Future;

use futures::future::BoxFuture;

use crate::prelude::*;

/// Work executed inside one transaction. Built fresh for every attempt.
pub type TxnFuture<'c, T> = BoxFuture<'c, Result<T>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub attempts: u32,
  pub base: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { attempts: 5, base: Duration::from_millis(100) }
  }
}

impl RetryPolicy {
  /// Pause after the failed `attempt` (1-based): `base * 2^(attempt - 1)`.
  pub fn delay(&self, attempt: u32) -> Duration {
    self.base * 2u32.saturating_pow(attempt.saturating_sub(1))
  }
}

/// Runs `op` until it succeeds, fails for good, or the policy is exhausted.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T>>,
{
  let mut attempt = 1;
  loop {
    match op().await {
      Err(err) if err.is_transient_storage() => {
        if attempt >= policy.attempts {
          error!(attempts = attempt, "Storage still busy, giving up: {err}");
          return Err(Error::StorageUnavailable { attempts: attempt });
        }
        let delay = policy.delay(attempt);
        warn!(attempt, ?delay, "Storage busy, retrying: {err}");
        time::sleep(delay).await;
        attempt += 1;
      }
      result => return result,
    }
  }
}

#[derive(Debug, Clone)]
pub struct Store {
  db: DatabaseConnection,
  policy: RetryPolicy,
}

impl Store {
  pub fn new(db: DatabaseConnection, policy: RetryPolicy) -> Self {
    Self { db, policy }
  }

  /// Executes `op` in a single transaction, committing on success and
  /// replaying the whole transaction on contention.
  pub async fn run<T, F>(&self, op: F) -> Result<T>
  where
    F: for<'c> Fn(&'c DatabaseTransaction) -> TxnFuture<'c, T>,
    T: Send,
  {
    let db = &self.db;
    let op = &op;

    retry(self.policy, || async move {
      let txn = db.begin().await?;
      let result = op(&txn).await;
      match result {
        Ok(value) => {
          txn.commit().await?;
          Ok(value)
        }
        Err(err) => {
          if let Err(rollback) = txn.rollback().await {
            warn!("Rollback failed: {rollback}");
          }
          Err(err)
        }
      }
    })
    .await
  }

  /// Non-transactional read with the same retry policy.
  pub async fn read<T, F>(&self, op: F) -> Result<T>
  where
    F: for<'c> Fn(&'c DatabaseConnection) -> BoxFuture<'c, Result<T>>,
  {
    let db = &self.db;
    let op = &op;
    retry(self.policy, || op(db)).await
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicU32, Ordering};

  use sea_orm::DbErr;
  use tokio_test::assert_ok;

  use super::*;

  fn busy() -> Error {
    Error::Database(DbErr::Custom("database is locked".into()))
  }

  fn fast() -> RetryPolicy {
    RetryPolicy { attempts: 5, base: Duration::from_millis(1) }
  }

  #[test]
  fn backoff_doubles() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.delay(1), Duration::from_millis(100));
    assert_eq!(policy.delay(2), Duration::from_millis(200));
    assert_eq!(policy.delay(4), Duration::from_millis(800));
  }

  #[tokio::test]
  async fn gives_up_after_five_attempts() {
    let calls = &AtomicU32::new(0);

    let result: Result<()> = retry(fast(), || async move {
      calls.fetch_add(1, Ordering::SeqCst);
      Err(busy())
    })
    .await;

    assert!(matches!(result, Err(Error::StorageUnavailable { attempts: 5 })));
    assert_eq!(calls.load(Ordering::SeqCst), 5);
  }

  #[tokio::test]
  async fn succeeds_on_third_attempt() {
    let calls = &AtomicU32::new(0);

    let result = retry(fast(), || async move {
      let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
      if n < 3 { Err(busy()) } else { Ok(n) }
    })
    .await;

    assert_eq!(assert_ok!(result), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn other_errors_are_not_retried() {
    let calls = &AtomicU32::new(0);

    let result: Result<()> = retry(fast(), || async move {
      calls.fetch_add(1, Ordering::SeqCst);
      Err(Error::NotFound("payment"))
    })
    .await;

    assert!(matches!(result, Err(Error::NotFound(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn failed_transaction_leaves_nothing_behind() {
    let db = crate::testing::db().await;
    let store = Store::new(db.clone(), fast());

    let result: Result<()> = store
      .run(|txn| {
        Box::pin(async move {
          crate::sv::User::new(txn).get_or_create(42, None).await?;
          Err(Error::validation("abort"))
        })
      })
      .await;

    assert!(matches!(result, Err(Error::Validation(_))));
    assert!(crate::sv::User::new(&db).by_id(42).await.unwrap().is_none());
  }
}
