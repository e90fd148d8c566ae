//! Per-key reconcile serialization. Every controller binary acquires a
//! `KeyedLocks` guard for an object's name before dispatching to its
//! reconcile function, so two workers never reconcile the same object
//! concurrently, while unrelated objects reconcile in parallel up to a
//! `tokio::sync::Semaphore` bound on total concurrency.

mod resync;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::OwnedMutexGuard;

pub use resync::{FibonacciBackoff, ResyncTracker};

#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `key`, creating it on first use. Stale
    /// entries for deleted objects are harmless garbage: a future
    /// reconcile of a same-named recreated object just reuses the lock,
    /// which is still correct since it only ever serializes, never
    /// distinguishes identity.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poison| poison.into_inner());
            locks.entry(key.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn serializes_same_key() {
        let locks = Arc::new(KeyedLocks::new());
        let order = Arc::new(AsyncMutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let locks = locks.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("server-a").await;
                order.lock().await.push(i);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(order.lock().await.len(), 5);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block_each_other() {
        let locks = KeyedLocks::new();
        let a = locks.acquire("a").await;
        let b = locks.acquire("b").await;
        drop(a);
        drop(b);
    }
}
