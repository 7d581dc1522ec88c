//! In-memory per-name locks serializing ranged writes.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Advisory async mutexes keyed by upload file name, created on demand.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `name`, waiting for the current holder to
    /// release it. Holding the guard serializes ranged writes to one file.
    pub async fn lock_name(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(normalize_lock_key(name))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

fn normalize_lock_key(name: &str) -> String {
    let trimmed = name.trim().trim_start_matches(['/', '\\']);
    trimmed.replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::LockManager;
    use std::time::Duration;

    #[tokio::test]
    async fn same_name_is_serialized() {
        let manager = LockManager::new();
        let guard = manager.lock_name("file.bin").await;

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), manager.lock_name("file.bin")).await;
        assert!(blocked.is_err(), "second acquisition should wait");

        drop(guard);
        tokio::time::timeout(Duration::from_millis(50), manager.lock_name("file.bin"))
            .await
            .expect("lock should be free after release");
    }

    #[tokio::test]
    async fn different_names_do_not_contend() {
        let manager = LockManager::new();
        let _guard = manager.lock_name("a.bin").await;
        tokio::time::timeout(Duration::from_millis(50), manager.lock_name("b.bin"))
            .await
            .expect("unrelated name should not block");
    }
}
