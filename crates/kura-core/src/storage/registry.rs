use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use parking_lot::ReentrantMutex;

use crate::error::Result;
use crate::storage::backend::Backend;
use crate::storage::file::FileBackend;

/// Cache of live backends, one per logical key.
///
/// A single reentrant lock guards the whole map. The lock is coarse on
/// purpose: backend construction is rare and cheap relative to the
/// contention cost of finer locking, and check-then-create must be one
/// critical section so concurrent callers can never observe two live
/// instances for one key. Reentrancy lets a constructor resolve another
/// backend on the same thread without deadlocking.
#[derive(Default)]
pub struct StorageRegistry {
    backends: ReentrantMutex<RefCell<HashMap<String, Arc<dyn Backend>>>>,
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self {
            backends: ReentrantMutex::new(RefCell::new(HashMap::new())),
        }
    }

    /// Cached backend for `key`, or the result of `ctor` cached under it.
    ///
    /// A failing constructor caches nothing, so a later call under the
    /// same key (e.g. after correcting the macro table) may succeed.
    pub fn get_or_create<F>(&self, key: &str, ctor: F) -> Result<Arc<dyn Backend>>
    where
        F: FnOnce() -> Result<Arc<dyn Backend>>,
    {
        let guard = self.backends.lock();
        if let Some(backend) = guard.borrow().get(key) {
            return Ok(backend.clone());
        }
        // The RefCell borrow is released here so `ctor` may re-enter the
        // registry from this thread.
        let backend = ctor()?;
        guard.borrow_mut().insert(key.to_string(), backend.clone());
        Ok(backend)
    }

    /// Backends already resident for `keys`, filtered to the file-based
    /// variant. Never triggers construction; callers use this to learn
    /// which on-disk files a set of keys is implicated in without
    /// materializing lazy backends.
    pub fn cached_file_backends<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> Vec<Arc<FileBackend>> {
        let guard = self.backends.lock();
        let map = guard.borrow();
        keys.into_iter()
            .filter_map(|key| map.get(key).cloned())
            .filter_map(|backend| {
                let any: Arc<dyn Any + Send + Sync> = backend;
                Arc::downcast::<FileBackend>(any).ok()
            })
            .collect()
    }

    /// Evict `key`. The evicted backend is returned unflushed and
    /// unclosed; finishing it off is the caller's concern. Subsequent
    /// `get_or_create` calls on the same key construct afresh.
    pub fn remove(&self, key: &str) -> Option<Arc<dyn Backend>> {
        let guard = self.backends.lock();
        let removed = guard.borrow_mut().remove(key);
        if removed.is_some() {
            debug!("Evicted storage {}", key);
        }
        removed
    }

    /// Snapshot of the currently cached keys
    pub fn keys(&self) -> Vec<String> {
        let guard = self.backends.lock();
        let keys = guard.borrow().keys().cloned().collect();
        keys
    }

    pub fn len(&self) -> usize {
        let guard = self.backends.lock();
        let len = guard.borrow().len();
        len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached backend
    pub fn clear(&self) {
        let guard = self.backends.lock();
        guard.borrow_mut().clear();
    }
}

impl fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageRegistry")
            .field("len", &self.len())
            .finish()
    }
}
