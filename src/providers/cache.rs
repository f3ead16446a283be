//! # Per-Queue Cache
//!
//! Queue name → value map with atomic get-or-create. Each key owns a
//! `OnceCell`, so concurrent first requests for the same queue run the
//! initialiser once and every caller observes the same value. A failed
//! initialiser leaves no entry behind once no other caller is waiting on
//! the slot, so the next caller retries from scratch.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

#[derive(Debug)]
pub struct QueueCache<T> {
    entries: DashMap<String, Arc<OnceCell<T>>>,
}

impl<T: Clone> QueueCache<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Return the cached value, running `init` only if the queue has none yet
    pub async fn get_or_try_init<F, Fut, E>(&self, queue_name: &str, init: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        // The map guard must not be held across the await below
        let cell = Arc::clone(self.entries.entry(queue_name.to_string()).or_default().value());

        let result = cell.get_or_try_init(init).await.cloned();
        if result.is_err() {
            drop(cell);
            // Waiters hold their own clone of the cell; leave it for them
            self.entries.remove_if(queue_name, |_, cell| {
                !cell.initialized() && Arc::strong_count(cell) == 1
            });
        }
        result
    }

    pub fn get(&self, queue_name: &str) -> Option<T> {
        self.entries
            .get(queue_name)
            .and_then(|cell| cell.get().cloned())
    }

    pub fn contains(&self, queue_name: &str) -> bool {
        self.get(queue_name).is_some()
    }

    /// Number of initialised entries
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Initialised queue names, sorted
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().initialized())
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Initialised values in queue name order
    pub fn values(&self) -> Vec<T> {
        self.queue_names()
            .iter()
            .filter_map(|name| self.get(name))
            .collect()
    }
}

impl<T: Clone> Default for QueueCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
