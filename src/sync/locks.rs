use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-entity async locks, keyed by strings such as `classroom:3`.
///
/// Operations on the same key run one at a time; different keys never block each
/// other. Idle entries are pruned when a new lock is taken.
#[derive(Default)]
pub struct EntityLocks {
    entries: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: impl Into<String>) -> OwnedMutexGuard<()> {
        let lock = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.retain(|_, lock| Arc::strong_count(lock) > 1);
            entries
                .entry(key.into())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

pub fn classroom_key(id: &str) -> String {
    format!("classroom:{id}")
}

pub fn assignment_key(id: &str) -> String {
    format!("assignment:{id}")
}

pub fn student_key(id: &str) -> String {
    format!("student:{id}")
}
