use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use crate::progress::Identifier;

/// FIFO of identifiers shared by all workers. Each identifier is handed out once.
#[derive(Debug, Default)]
pub struct WorkQueue {
    items: Mutex<VecDeque<Identifier>>,
}

impl WorkQueue {
    /// Duplicates collapse to their first occurrence.
    pub fn new(ids: impl IntoIterator<Item = Identifier>) -> Self {
        let mut seen = HashSet::new();
        let items = ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        Self {
            items: Mutex::new(items),
        }
    }

    pub fn pop(&self) -> Option<Identifier> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
