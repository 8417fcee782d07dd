//! Bounded FIFO with a drop policy for overflowing pushes.
//!
//! [BoundedBuffer] is a plain data structure. The [Reader](crate::Reader)
//! keeps it behind a single mutex, together with the pump state, so that all
//! mutations and all wakeups happen in one synchronization domain.

use std::collections::VecDeque;

/// What to discard when an item arrives at a full buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Overflow {
    /// Discard the incoming item.
    #[default]
    DropNewest,
    /// Evict the item at the head of the buffer, then append the incoming one.
    DropOldest,
}

/// Number and cumulative size of items that were never retained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropStats {
    /// Dropped items.
    pub count: u64,
    /// Sum of the sizes of the dropped items, in bytes.
    pub bytes: u64,
}

impl DropStats {
    fn record(&mut self, size: usize) {
        self.count += 1;
        self.bytes += size as u64;
    }
}

/// Outcome of [BoundedBuffer::push].
#[derive(Debug, PartialEq, Eq)]
pub enum Push<T> {
    /// The item was appended.
    Stored,
    /// The buffer was full and the incoming item was discarded.
    Dropped(T, usize),
    /// The buffer was full and its oldest item was evicted to make room.
    Evicted(T, usize),
}

impl<T> Push<T> {
    /// The item that did not make it into the buffer, if any.
    pub fn into_dropped(self) -> Option<(T, usize)> {
        match self {
            Push::Stored => None,
            Push::Dropped(item, size) | Push::Evicted(item, size) => Some((item, size)),
        }
    }
}

struct Entry<T> {
    item: T,
    size: usize,
}

/// FIFO that holds at most `capacity` items (`0` means unbounded).
pub struct BoundedBuffer<T> {
    entries: VecDeque<Entry<T>>,
    capacity: usize,
    overflow: Overflow,
    stats: DropStats,
}

impl<T> BoundedBuffer<T> {
    /// Create a buffer for at most `capacity` items, `0` for no limit.
    pub fn new(capacity: usize, overflow: Overflow) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            overflow,
            stats: DropStats::default(),
        }
    }

    /// Maximum number of items, `0` if unbounded.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a push right now would have to drop an item.
    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.entries.len() >= self.capacity
    }

    /// Append `item`, accounting `size` bytes to it.
    ///
    /// A full buffer applies its [Overflow] policy and records the loss in
    /// [DropStats]. The discarded item is handed back to the caller.
    pub fn push(&mut self, item: T, size: usize) -> Push<T> {
        if !self.is_full() {
            self.entries.push_back(Entry { item, size });
            return Push::Stored;
        }

        match self.overflow {
            Overflow::DropNewest => {
                self.stats.record(size);
                Push::Dropped(item, size)
            }
            Overflow::DropOldest => {
                let evicted = self.entries.pop_front();
                self.entries.push_back(Entry { item, size });
                match evicted {
                    Some(old) => {
                        self.stats.record(old.size);
                        Push::Evicted(old.item, old.size)
                    }
                    // capacity > 0 and full, so there always is a head
                    None => Push::Stored,
                }
            }
        }
    }

    /// Remove the oldest item.
    pub fn pop(&mut self) -> Option<T> {
        self.entries.pop_front().map(|e| e.item)
    }

    /// Remove up to `max` items (all if `None`), oldest first.
    pub fn drain(&mut self, max: Option<usize>) -> Vec<T> {
        let n = max.map_or(self.entries.len(), |m| m.min(self.entries.len()));
        self.entries.drain(..n).map(|e| e.item).collect()
    }

    /// Snapshot of the drop statistics.
    pub fn stats(&self) -> DropStats {
        self.stats
    }

    /// Snapshot the drop statistics and reset them to zero.
    pub fn take_stats(&mut self) -> DropStats {
        std::mem::take(&mut self.stats)
    }
}
