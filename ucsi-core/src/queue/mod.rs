//! Fixed-capacity FIFO holding commands until the service loop consumes them.
//!
//! The ring never allocates and never drops an item on its own: a full queue
//! hands the rejected command back to the caller, which treats it as
//! transient backpressure.

use core::fmt;

use heapless::Deque;

use crate::command::DEFAULT_COMMAND_QUEUE_DEPTH;

/// Error returned when the queue has no free slot. Carries the rejected item.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueueFull<T>(pub T);

impl<T> QueueFull<T> {
    /// Returns the command that could not be queued.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("command queue is full")
    }
}

/// Single-consumer command ring.
pub struct CommandRing<T, const N: usize = DEFAULT_COMMAND_QUEUE_DEPTH> {
    entries: Deque<T, N>,
}

impl<T, const N: usize> CommandRing<T, N> {
    /// Creates an empty ring.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Deque::new(),
        }
    }

    /// Appends a command at the back of the queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueFull`] with the command when all `N` slots are taken.
    pub fn enqueue(&mut self, command: T) -> Result<(), QueueFull<T>> {
        self.entries.push_back(command).map_err(QueueFull)
    }

    /// Returns the oldest command without consuming it.
    #[must_use]
    pub fn peek_front(&self) -> Option<&T> {
        self.entries.front()
    }

    /// Removes the oldest command.
    ///
    /// Popping an empty queue is a caller bug; debug builds panic.
    pub fn pop_front(&mut self) -> Option<T> {
        debug_assert!(!self.entries.is_empty(), "pop_front on an empty command queue");
        self.entries.pop_front()
    }

    /// Number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Maximum number of queued commands.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    /// Free slots left before [`CommandRing::enqueue`] reports backpressure.
    #[must_use]
    pub fn remaining(&self) -> usize {
        N.saturating_sub(self.entries.len())
    }

    /// Iterates queued commands from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}

impl<T, const N: usize> Default for CommandRing<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_enqueue_past_capacity_and_recovers_after_pop() {
        let mut ring = CommandRing::<u8, 4>::new();
        for value in 0..4 {
            ring.enqueue(value).expect("slot available");
        }

        assert!(ring.is_full());
        assert_eq!(ring.enqueue(4), Err(QueueFull(4)));
        assert_eq!(ring.len(), 4, "rejected item must not be stored");

        assert_eq!(ring.pop_front(), Some(0));
        ring.enqueue(4).expect("slot freed by pop");
        assert!(ring.iter().copied().eq([1, 2, 3, 4]));
    }

    #[test]
    fn peek_does_not_consume() {
        let mut ring = CommandRing::<&str, 2>::new();
        assert!(ring.peek_front().is_none());

        ring.enqueue("stop").expect("enqueue");
        ring.enqueue("init").expect("enqueue");

        assert_eq!(ring.peek_front(), Some(&"stop"));
        assert_eq!(ring.peek_front(), Some(&"stop"));
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.remaining(), 0);
    }

    #[test]
    fn wraps_around_repeatedly_in_fifo_order() {
        let mut ring = CommandRing::<u32, 3>::new();
        let mut expected = 0;
        for value in 0..20 {
            ring.enqueue(value).expect("enqueue");
            if ring.len() == 2 {
                assert_eq!(ring.pop_front(), Some(expected));
                expected += 1;
            }
        }
        assert_eq!(ring.capacity(), 3);
        assert_eq!(ring.peek_front(), Some(&expected));
    }

    #[test]
    fn default_capacity_matches_configured_depth() {
        let ring = CommandRing::<u8>::default();
        assert_eq!(ring.capacity(), DEFAULT_COMMAND_QUEUE_DEPTH);
        assert_eq!(ring.remaining(), DEFAULT_COMMAND_QUEUE_DEPTH);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "pop_front on an empty command queue")]
    fn popping_empty_queue_panics_in_debug() {
        let mut ring = CommandRing::<u8, 2>::new();
        let _ = ring.pop_front();
    }

    #[test]
    fn full_error_returns_item() {
        let mut ring = CommandRing::<u8, 1>::new();
        ring.enqueue(1).expect("enqueue");
        let err = ring.enqueue(2).expect_err("queue is full");
        assert_eq!(err.into_inner(), 2);
    }
}
