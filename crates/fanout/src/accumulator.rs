use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Append-only container shared between workers.
///
/// Clones share the same underlying collection; [`push()`](Self::push)
/// serialises appends, so workers never lock anything themselves.
#[derive(Debug)]
pub struct Accumulator<C> {
    inner: Arc<Mutex<C>>,
}

impl<C: Default> Accumulator<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<T>(&self, item: T)
    where
        C: Extend<T>,
    {
        self.lock().extend(std::iter::once(item));
    }

    /// Take everything collected so far, leaving the accumulator empty.
    pub fn take(&self) -> C {
        std::mem::take(&mut *self.lock())
    }

    pub fn into_inner(self) -> C {
        self.take()
    }

    fn lock(&self) -> MutexGuard<'_, C> {
        // A worker that panicked mid-push can't leave a Vec or HashSet
        // half-updated, so a poisoned lock is still safe to use.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Default> Default for Accumulator<C> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(C::default())),
        }
    }
}

impl<C> Clone for Accumulator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
