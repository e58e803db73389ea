//! Single-slot async cache.
//!
//! A [`Slot`] holds at most one value. Readers get clones; writers take the
//! lock exclusively, so a reader never observes a partially replaced value.

use std::future::Future;

use tokio::sync::RwLock;

#[derive(Debug)]
pub struct Slot<T> {
    value: RwLock<Option<T>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self { value: RwLock::new(None) }
    }
}

impl<T: Clone> Slot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<T> {
        self.value.read().await.clone()
    }

    pub async fn has_value(&self) -> bool {
        self.value.read().await.is_some()
    }

    /// Replaces the current value, returning the previous one.
    pub async fn set(&self, value: T) -> Option<T> {
        self.value.write().await.replace(value)
    }

    pub async fn take(&self) -> Option<T> {
        self.value.write().await.take()
    }

    pub async fn invalidate(&self) {
        self.value.write().await.take();
    }

    /// Returns the cached value, or runs `init` under the write lock and caches
    /// its success. Failures leave the slot empty.
    pub async fn get_or_try_init<F, Fut, E>(&self, init: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.value.read().await.as_ref() {
            return Ok(value.clone());
        }

        let mut guard = self.value.write().await;
        // another writer may have filled the slot while we waited
        if let Some(value) = guard.as_ref() {
            return Ok(value.clone());
        }

        let value = init().await?;
        *guard = Some(value.clone());
        Ok(value)
    }
}
