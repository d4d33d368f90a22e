//! Typed observer lists
//!
//! Services expose notifications ("scale settings changed", "safety event",
//! "body registered") through an `Observers<E>` list instead of global
//! delegates. Callbacks run synchronously on the notifying thread and must
//! not subscribe or unsubscribe from inside the callback.

use crate::utils::sync;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Identifies a subscription so it can be removed later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Callback<E> = Box<dyn Fn(&E) + Send + Sync>;

/// A list of callbacks notified with events of type `E`
pub struct Observers<E> {
    callbacks: RwLock<Vec<(ObserverId, Callback<E>)>>,
    next_id: AtomicU64,
}

impl<E> Observers<E> {
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a callback
    pub fn subscribe(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        sync::write(&self.callbacks).push((id, Box::new(callback)));
        id
    }

    /// Remove a callback, returning whether it was registered
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut callbacks = sync::write(&self.callbacks);
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    pub fn notify(&self, event: &E) {
        for (_, callback) in sync::read(&self.callbacks).iter() {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        sync::read(&self.callbacks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("subscribers", &self.len())
            .finish()
    }
}
