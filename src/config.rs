use std::time::Duration;

use crate::buffer::Overflow;

/// How long the pump sleeps after the source reported that no data is available.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Settings of a [Reader](crate::Reader), fixed once the pump is spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Size hint passed to every read. `None` lets the source decide.
    pub chunk_size: Option<usize>,
    /// Read line by line instead of in chunks.
    pub lines: bool,
    /// Maximum number of buffered items, `0` for no limit.
    pub capacity: usize,
    /// How long the pump waits for space in a full buffer before dropping.
    pub drop_timeout: Option<Duration>,
    /// Which item to drop when the buffer is full.
    pub overflow: Overflow,
    /// Sleep between retries while the source has no data.
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: None,
            lines: false,
            capacity: 0,
            drop_timeout: None,
            overflow: Overflow::DropNewest,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}
