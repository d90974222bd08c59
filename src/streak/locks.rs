use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Per-user mutual exclusion for read-evaluate-write sequences.
///
/// Two refreshes for the same user run one after the other; refreshes for
/// different users never wait on each other beyond the map lookup.
#[derive(Debug, Default)]
pub struct UserLocks {
    slots: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn with_user<T>(&self, user_id: i64, task: impl FnOnce() -> T) -> T {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(user_id).or_default())
        };

        let result = {
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            task()
        };

        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // The map holds one reference and `slot` another; anything more is a waiter.
        if Arc::strong_count(&slot) <= 2 {
            slots.remove(&user_id);
        }

        result
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
