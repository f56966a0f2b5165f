use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Map cleanup kicks in once this many device entries have accumulated.
const PRUNE_THRESHOLD: usize = 1024;

/// Per-device serialization point.
///
/// Two concurrent applies for the same device take turns; applies for
/// different devices share nothing and proceed fully in parallel. The guard is
/// owned, so it can be held across await points inside the coordinator's
/// critical section.
#[derive(Default)]
pub struct DeviceLockRegistry {
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl DeviceLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, device_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() > PRUNE_THRESHOLD {
                // Entries only referenced by the map are uncontended and safe
                // to drop.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(locks.entry(device_id).or_default())
        };
        lock.lock_owned().await
    }
}
