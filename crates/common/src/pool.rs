//! Generic object pool
//!
//! Objects are checked out with `acquire` and handed back when the returned
//! guard drops, so every exit path of the caller (including `?` and early
//! returns) releases them. Pooled objects must not carry per-target state.

use parking_lot::Mutex;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct Pool<T> {
    items: Mutex<Vec<T>>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    max_idle: usize,
    created: AtomicUsize,
}

impl<T> Pool<T> {
    /// Create an empty pool. At most `max_idle` released objects are retained.
    pub fn new<F>(max_idle: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            items: Mutex::new(Vec::new()),
            factory: Box::new(factory),
            max_idle,
            created: AtomicUsize::new(0),
        }
    }

    /// Check out an idle object, building a new one if none is available.
    pub fn acquire(&self) -> Pooled<'_, T> {
        let item = self.items.lock().pop().unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            (self.factory)()
        });
        Pooled {
            item: Some(item),
            pool: self,
        }
    }

    fn release(&self, item: T) {
        let mut items = self.items.lock();
        if items.len() < self.max_idle {
            items.push(item);
        }
    }

    /// Objects currently idle in the pool.
    pub fn idle(&self) -> usize {
        self.items.lock().len()
    }

    /// Objects built by the factory over the pool's lifetime.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.idle())
            .field("created", &self.created())
            .field("max_idle", &self.max_idle)
            .finish()
    }
}

/// Checked-out pool object; returns to its pool on drop.
pub struct Pooled<'a, T> {
    item: Option<T>,
    pool: &'a Pool<T>,
}

impl<T> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // only taken in Drop
        self.item.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<T> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.release(item);
        }
    }
}
