use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::prelude::*;

/// Serializes work per key inside this process.
///
/// Only an optimisation against duplicate polls and provisioning; the unique
/// index on `subscriptions.payment_reference` is what actually prevents a
/// double activation.
#[derive(Debug, Default)]
pub struct Guard {
  locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl Guard {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn lock(&self, key: &str) -> Lease {
    let mutex = self
      .locks
      .entry(key.to_string())
      .or_insert_with(|| Arc::new(Mutex::new(())))
      .clone();

    let guard = mutex.lock_owned().await;
    Lease { key: key.to_string(), locks: self.locks.clone(), guard: Some(guard) }
  }

  /// Keys currently held or waited on.
  pub fn len(&self) -> usize {
    self.locks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.locks.is_empty()
  }
}

/// Held lock. The map entry goes away with the last lease for the key.
pub struct Lease {
  key: String,
  locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
  guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for Lease {
  fn drop(&mut self) {
    // release first so the strong count only covers waiters and the map
    drop(self.guard.take());
    self.locks.remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
  }
}
