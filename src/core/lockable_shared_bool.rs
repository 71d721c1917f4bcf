use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::lock_api::RawMutex as _;
use parking_lot::RawMutex;

pub(crate) struct SharedBoolData {
    value: AtomicBool,
    lock: RawMutex,
}

/// A thread-safe, reference-counted boolean with an explicit lock.
///
/// Objects hand these out as weak-reference flags: the flag flips to `true`
/// when the object is destroyed, so a holder of the flag can tell whether a
/// weak reference is still valid. Use [`lock_guard`](Self::lock_guard) to
/// make a check-then-act sequence atomic with respect to the destruction.
///
/// ```
/// use angelscript_runtime::prelude::*;
///
/// let flag = LockableSharedBool::new();
/// {
///     let guard = flag.lock_guard();
///     assert!(!guard.get());
///     guard.set(true);
/// }
/// assert!(flag.get());
/// ```
#[derive(Clone)]
pub struct LockableSharedBool(pub(crate) Arc<SharedBoolData>);

impl LockableSharedBool {
    pub fn new() -> Self {
        LockableSharedBool(Arc::new(SharedBoolData {
            value: AtomicBool::new(false),
            lock: RawMutex::INIT,
        }))
    }

    pub fn get(&self) -> bool {
        self.0.value.load(Ordering::Acquire)
    }

    pub fn set(&self, value: bool) {
        self.0.value.store(value, Ordering::Release);
    }

    /// Acquire the lock. Pair with [`unlock`](Self::unlock).
    pub fn lock(&self) {
        self.0.lock.lock();
    }

    /// Release a lock taken with [`lock`](Self::lock).
    ///
    /// # Safety
    /// The current thread must hold the lock.
    pub unsafe fn unlock(&self) {
        unsafe { self.0.lock.unlock() }
    }

    pub fn lock_guard(&self) -> LockableSharedBoolGuard<'_> {
        self.lock();
        LockableSharedBoolGuard { flag: self }
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn ptr_eq(&self, other: &LockableSharedBool) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for LockableSharedBool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LockableSharedBool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LockableSharedBool").field(&self.get()).finish()
    }
}

/// Holds a [`LockableSharedBool`] locked until dropped.
pub struct LockableSharedBoolGuard<'a> {
    flag: &'a LockableSharedBool,
}

impl LockableSharedBoolGuard<'_> {
    pub fn get(&self) -> bool {
        self.flag.get()
    }

    pub fn set(&self, value: bool) {
        self.flag.set(value);
    }
}

impl Drop for LockableSharedBoolGuard<'_> {
    fn drop(&mut self) {
        unsafe { self.flag.unlock() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn clones_share_state() {
        let flag = LockableSharedBool::new();
        let other = flag.clone();
        assert_eq!(flag.ref_count(), 2);
        other.set(true);
        assert!(flag.get());
        assert!(flag.ptr_eq(&other));
    }

    #[test]
    fn guard_serialises_threads() {
        let flag = LockableSharedBool::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let flag = flag.clone();
                thread::spawn(move || {
                    let guard = flag.lock_guard();
                    let seen = guard.get();
                    guard.set(!seen);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        // four flips
        assert!(!flag.get());
    }
}
