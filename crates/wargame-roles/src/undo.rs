//! Bounded undo history

use std::collections::VecDeque;

/// Default number of undoable mutations kept
pub const DEFAULT_UNDO_LIMIT: usize = 50;

/// Inverse of one mutation
#[derive(Debug, Clone, PartialEq)]
pub enum UndoEntry<T> {
    /// Item removed from `index`
    Deleted {
        /// Position before removal
        index: usize,
        /// Removed item
        item: T,
    },
    /// Item replaced; `original` is the prior value
    Edited {
        /// Value before the edit
        original: T,
    },
}

/// What a push did to the history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Stored
    Stored,
    /// Stored after dropping the oldest entry for the first time
    LimitReached,
    /// Stored after dropping the oldest entry again
    Trimmed,
}

/// Last-in first-out history with a fixed capacity
#[derive(Debug, Clone)]
pub struct UndoStack<T> {
    entries: VecDeque<UndoEntry<T>>,
    limit: usize,
    overflowed: bool,
}

impl<T> UndoStack<T> {
    /// Stack keeping at most `limit` entries (at least one)
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            entries: VecDeque::with_capacity(limit),
            limit,
            overflowed: false,
        }
    }

    /// Record an inverse, dropping the oldest one when full
    pub fn push(&mut self, entry: UndoEntry<T>) -> PushOutcome {
        self.entries.push_back(entry);
        if self.entries.len() <= self.limit {
            return PushOutcome::Stored;
        }
        self.entries.pop_front();
        if self.overflowed {
            PushOutcome::Trimmed
        } else {
            self.overflowed = true;
            PushOutcome::LimitReached
        }
    }

    /// Take the most recent inverse
    pub fn pop(&mut self) -> Option<UndoEntry<T>> {
        self.entries.pop_back()
    }

    /// Entries held
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there is nothing to undo
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Capacity
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.entries.clear();
        self.overflowed = false;
    }
}

impl<T> Default for UndoStack<T> {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_most_recent_first() {
        let mut stack = UndoStack::new(5);
        stack.push(UndoEntry::Edited { original: 1 });
        stack.push(UndoEntry::Deleted { index: 0, item: 2 });
        assert_eq!(stack.pop(), Some(UndoEntry::Deleted { index: 0, item: 2 }));
        assert_eq!(stack.pop(), Some(UndoEntry::Edited { original: 1 }));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn overflow_reports_limit_once_and_drops_oldest() {
        let mut stack = UndoStack::new(DEFAULT_UNDO_LIMIT);
        for i in 0..DEFAULT_UNDO_LIMIT {
            assert_eq!(stack.push(UndoEntry::Edited { original: i }), PushOutcome::Stored);
        }
        assert_eq!(
            stack.push(UndoEntry::Edited { original: 50 }),
            PushOutcome::LimitReached
        );
        assert_eq!(
            stack.push(UndoEntry::Edited { original: 51 }),
            PushOutcome::Trimmed
        );
        assert_eq!(stack.len(), DEFAULT_UNDO_LIMIT);

        let mut oldest = None;
        while let Some(entry) = stack.pop() {
            oldest = Some(entry);
        }
        assert_eq!(oldest, Some(UndoEntry::Edited { original: 2 }));
    }
}
