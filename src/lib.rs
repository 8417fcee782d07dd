//! Non-blocking reads from blocking streams
//!
//! - A pump thread reads a [StreamSource] (e.g. a child's stdout pipe) in a loop.
//! - Items end up in a bounded FIFO that any number of threads can poll.
//! - Full buffers drop the newest or the oldest item and count the loss.
//! - Consumers can poll ([read_one](Reader::read_one),
//!   [read_many](Reader::read_many)) or wait ([block](Reader::block),
//!   [recv](Reader::recv)) for data or for the pump to stop.
//! - Hooks to tag reads, transform chunks, and observe dropped items.
//!
//! # Quick Start
//!
//! ```
//! # use nonblocking::{IoSource, Reader, ReaderError};
//! use std::io::Cursor;
//!
//! let source = IoSource::new(Cursor::new(b"hello\nworld\n".to_vec()));
//! let reader = Reader::builder().lines(true).capacity(16).spawn(source)?;
//!
//! // blocks until a line arrives or the pump stops
//! let lines: Vec<Vec<u8>> = reader.iter().collect();
//! assert_eq!(lines, vec![b"hello\n".to_vec(), b"world\n".to_vec()]);
//! assert!(!reader.is_pumping());
//! assert_eq!(reader.dropped().count, 0);
//! # Ok::<(), ReaderError>(())
//! ```
//!
//! # Details
//!
//! The buffer, the drop statistics and the pump state live behind one mutex
//! with one condition variable. Every change notifies all waiters, and every
//! waiter re-checks its condition, so a waiter is released both when data
//! arrives and when the pump stops.
//!
//! Stopping is cooperative. The pump checks for a stop request, a closed
//! source, and a dropped [owner](Builder::owner) before each read, but a read
//! that is in flight is never interrupted. On Unix,
//! [set_nonblocking](source::set_nonblocking) makes pipe reads return
//! immediately, which bounds the shutdown latency to the poll interval.
//!
//! When the pump fails, the error is kept as the [StopReason] and the pump
//! stops like it would at the end of the stream.

pub mod buffer;
mod config;
mod error;
mod gate;
mod pump;
mod reader;
pub mod source;

pub use buffer::{BoundedBuffer, DropStats, Overflow};
pub use config::{Config, DEFAULT_POLL_INTERVAL};
pub use error::{BoxError, ReaderError};
pub use pump::StopReason;
pub use reader::{Builder, Iter, Reader, TryIter};
pub use source::{Chunk, IoSource, StreamSource};
