use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;

/// State behind one reentrant lock.
///
/// The lock can be held across calls that recurse back into the owner (bean creation does),
/// while every mutation goes through [`ReentrantCell::with`], whose borrow never outlives the closure.
/// Closures passed to `with` must not call out to user code.
pub(crate) struct ReentrantCell<T> {
    inner: ReentrantMutex<RefCell<T>>,
}

impl<T> ReentrantCell<T> {
    #[inline]
    #[must_use]
    pub(crate) fn new(value: T) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(value)),
        }
    }

    /// Acquires the lock for the caller's whole critical section.
    #[inline]
    #[must_use]
    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, RefCell<T>> {
        self.inner.lock()
    }

    #[inline]
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let guard = self.inner.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }
}
