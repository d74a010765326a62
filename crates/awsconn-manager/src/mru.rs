//! Most-recently-used lists.

use std::collections::VecDeque;

/// Bounded, duplicate-free list ordered most-recent-first.
///
/// # Examples
///
/// ```
/// use awsconn_manager::RecencyList;
///
/// let mut recent = RecencyList::new(2);
/// recent.promote("a");
/// recent.promote("b");
/// recent.promote("a");
/// recent.promote("c");
/// assert_eq!(recent.to_vec(), ["c", "a"]);
/// ```
#[derive(Debug, Clone)]
pub struct RecencyList<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: PartialEq + Clone> RecencyList<T> {
    /// Create an empty list holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Move `item` to the front, inserting it if absent and evicting the
    /// oldest entry when over capacity.
    pub fn promote(&mut self, item: T) {
        if let Some(pos) = self.items.iter().position(|existing| *existing == item) {
            self.items.remove(pos);
        }
        self.items.push_front(item);
        self.items.truncate(self.capacity);
    }

    /// Snapshot of the entries, most recent first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of entries kept.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
