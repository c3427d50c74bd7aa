// LWLock - Lightweight Lock implementations
// Named shared/exclusive locks held for short critical sections, never across
// transaction boundaries.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;

/// Lock mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LwLockMode {
    Shared,
    Exclusive,
}

impl fmt::Display for LwLockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LwLockMode::Shared => write!(f, "shared"),
            LwLockMode::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// A named lightweight lock
pub struct LwLock {
    name: &'static str,
    inner: RwLock<()>,
}

/// Guard releasing the lock when dropped
pub enum LwLockGuard<'a> {
    Shared(RwLockReadGuard<'a, ()>),
    Exclusive(RwLockWriteGuard<'a, ()>),
}

impl LwLockGuard<'_> {
    pub fn mode(&self) -> LwLockMode {
        match self {
            LwLockGuard::Shared(_) => LwLockMode::Shared,
            LwLockGuard::Exclusive(_) => LwLockMode::Exclusive,
        }
    }
}

impl LwLock {
    pub fn new(name: &'static str) -> Self {
        LwLock {
            name,
            inner: RwLock::new(()),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Acquire the lock, blocking until it is available
    pub fn acquire(&self, mode: LwLockMode) -> LwLockGuard<'_> {
        log::trace!("acquiring {} in {} mode", self.name, mode);
        match mode {
            LwLockMode::Shared => LwLockGuard::Shared(self.inner.read()),
            LwLockMode::Exclusive => LwLockGuard::Exclusive(self.inner.write()),
        }
    }

    /// Acquire the lock only if that is possible without waiting
    pub fn try_acquire(&self, mode: LwLockMode) -> Option<LwLockGuard<'_>> {
        match mode {
            LwLockMode::Shared => self.inner.try_read().map(LwLockGuard::Shared),
            LwLockMode::Exclusive => self.inner.try_write().map(LwLockGuard::Exclusive),
        }
    }

    /// Whether anyone currently holds the lock
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// Whether the lock is currently held exclusively
    pub fn is_locked_exclusive(&self) -> bool {
        self.inner.is_locked_exclusive()
    }
}

impl fmt::Debug for LwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LwLock")
            .field("name", &self.name)
            .field("locked", &self.is_locked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_lwlock_exclusive_blocks_others() {
        let lock = LwLock::new("TestLock");
        let guard = lock.acquire(LwLockMode::Exclusive);
        assert_eq!(guard.mode(), LwLockMode::Exclusive);
        assert!(lock.is_locked_exclusive());
        assert!(lock.try_acquire(LwLockMode::Shared).is_none());
        assert!(lock.try_acquire(LwLockMode::Exclusive).is_none());
        drop(guard);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_lwlock_shared_is_shared() {
        let lock = LwLock::new("TestLock");
        let _a = lock.acquire(LwLockMode::Shared);
        let b = lock.try_acquire(LwLockMode::Shared);
        assert!(b.is_some());
        assert!(lock.try_acquire(LwLockMode::Exclusive).is_none());
    }

    #[test]
    fn test_lwlock_serializes_critical_sections() {
        let lock = Arc::new(LwLock::new("TestLock"));
        let inside = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                let inside = inside.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let _g = lock.acquire(LwLockMode::Exclusive);
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
