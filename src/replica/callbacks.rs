//! Completion-callback bookkeeping for async submits.

use std::collections::HashMap;

/// One-shot completion callback fired when an entry is acknowledged (or
/// abandoned at shutdown).
pub type CompletionCallback = Box<dyn FnOnce(bool) + Send>;

/// Maps an entry's start offset to its completion callback.
///
/// Mutated only under the coordinator mutex. Offsets identify entries
/// uniquely, so each key holds at most one callback; an entry is removed
/// exactly when its callback is taken to be fired.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<u64, CompletionCallback>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        CallbackRegistry {
            callbacks: HashMap::new(),
        }
    }

    /// Register the callback for the entry starting at `offset`.
    pub fn insert(&mut self, offset: u64, callback: CompletionCallback) {
        let previous = self.callbacks.insert(offset, callback);
        debug_assert!(
            previous.is_none(),
            "duplicate completion callback at offset {}",
            offset
        );
    }

    /// Remove and return the callback for the entry starting at `offset`.
    pub fn take(&mut self, offset: u64) -> Option<CompletionCallback> {
        self.callbacks.remove(&offset)
    }

    /// Remove every pending callback, in ascending offset order.
    pub fn drain(&mut self) -> Vec<(u64, CompletionCallback)> {
        let mut drained: Vec<(u64, CompletionCallback)> = self.callbacks.drain().collect();
        drained.sort_by_key(|(offset, _)| *offset);
        drained
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}
