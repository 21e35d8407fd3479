// Per-key async locks; the map entry disappears once nobody holds or awaits it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

pub struct KeyedGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    slot: Arc<AsyncMutex<()>>,
    _guard: OwnedMutexGuard<()>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyedGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(
                slots
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        let guard = Arc::clone(&slot).lock_owned().await;
        KeyedGuard {
            owner: self,
            key: key.to_string(),
            slot,
            _guard: guard,
        }
    }

    /// Number of keys currently held or awaited.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        let mut slots = self.owner.slots.lock();
        if let Some(current) = slots.get(&self.key) {
            // map entry + our `slot` + the guard's own handle; anything more is a waiter.
            if Arc::ptr_eq(current, &self.slot) && Arc::strong_count(&self.slot) <= 3 {
                slots.remove(&self.key);
            }
        }
    }
}
