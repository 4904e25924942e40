// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{LockDescriptor, LockPrimitive};

/// Set of lock resources held within this process. Clones share the same set.
#[derive(Clone, Default)]
pub struct LockRegistry {
    held: Arc<Mutex<HashSet<String>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, descriptor: &LockDescriptor) -> InMemoryLock {
        InMemoryLock {
            registry: self.clone(),
            key: descriptor.key(),
            held: false,
        }
    }

    pub fn is_held(&self, descriptor: &LockDescriptor) -> bool {
        self.held.lock().contains(&descriptor.key())
    }
}

/// Process-local [`LockPrimitive`] backed by a [`LockRegistry`].
pub struct InMemoryLock {
    registry: LockRegistry,
    key: String,
    held: bool,
}

impl LockPrimitive for InMemoryLock {
    fn try_acquire_once(&mut self) -> bool {
        if !self.held {
            self.held = self.registry.held.lock().insert(self.key.clone());
        }
        self.held
    }

    fn release(&mut self) {
        if self.held {
            self.registry.held.lock().remove(&self.key);
            self.held = false;
        }
    }
}

impl Drop for InMemoryLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::lock::{LockUsage, RetryingLock};
    use crate::options::LockOptions;

    #[test]
    fn test_in_memory_lock() {
        let registry = LockRegistry::new();
        let descriptor = LockDescriptor::new(
            "t1",
            LockUsage::TableStatus,
            LockOptions {
                retry_count: 2,
                retry_interval: Duration::from_millis(1),
            },
        );

        let mut first = RetryingLock::new(descriptor.clone(), registry.lock_for(&descriptor));
        let mut second = RetryingLock::new(descriptor.clone(), registry.lock_for(&descriptor));
        {
            let _guard = first.lock().unwrap();
            assert!(registry.is_held(&descriptor));
            assert!(second.lock().is_none());
        }
        assert!(!registry.is_held(&descriptor));
        assert!(second.lock_with_retries());
        drop(second);
        assert!(!registry.is_held(&descriptor));
    }
}
