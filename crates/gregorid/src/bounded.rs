//! A minimal bounded concurrent collection.
//!
//! Backs the spare-generator pool, the reusable hasher pools and the
//! random-buffer pool: take an item if one is idle, give it back unless the
//! pool is full.

use parking_lot::Mutex;

pub(crate) struct BoundedPool<T> {
    items: Mutex<Vec<T>>,
    capacity: usize,
}

impl<T> BoundedPool<T> {
    /// A pool holding at most `capacity` idle items; `None` means unbounded.
    pub(crate) fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            capacity: capacity.unwrap_or(usize::MAX),
        }
    }

    /// Takes an idle item, if any.
    pub(crate) fn try_take(&self) -> Option<T> {
        self.items.lock().pop()
    }

    /// Returns an item to the pool, handing it back when the pool is full.
    pub(crate) fn try_put(&self, item: T) -> Result<(), T> {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            return Err(item);
        }
        items.push(item);
        Ok(())
    }

    /// Removes and returns every idle item.
    pub(crate) fn drain(&self) -> Vec<T> {
        core::mem::take(&mut *self.items.lock())
    }
}
