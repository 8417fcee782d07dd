//! The worker loop moving chunks from a [StreamSource] into the buffer.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::buffer::Push;
use crate::error::{BoxError, ReaderError};
use crate::gate::Gate;
use crate::source::{Chunk, StreamSource};

/// Why the pump stopped.
#[derive(Debug)]
pub enum StopReason {
    /// The source reported end of stream.
    EndOfStream,
    /// [stop](crate::Reader::stop) or [close](crate::Reader::close) was called.
    Requested,
    /// The source was closed underneath the pump.
    SourceClosed,
    /// The owner the pump was bound to was dropped.
    OwnerDropped,
    /// Reading, transforming, or a hook failed.
    Failed(ReaderError),
}

pub(crate) type PreRead<M> = Box<dyn FnMut() -> M + Send>;
pub(crate) type Transform<M, T> = Box<dyn FnMut(M, Vec<u8>) -> Result<T, BoxError> + Send>;
pub(crate) type DropObserver<T> = Box<dyn FnMut(T) + Send>;
pub(crate) type Owner = Weak<dyn Any + Send + Sync>;

pub(crate) struct Pump<M, T> {
    pub(crate) source: Box<dyn StreamSource>,
    pub(crate) gate: Arc<Gate<T>>,
    pub(crate) chunk_size: Option<usize>,
    pub(crate) lines: bool,
    pub(crate) drop_timeout: Option<Duration>,
    pub(crate) poll_interval: Duration,
    pub(crate) pre_read: PreRead<M>,
    pub(crate) transform: Transform<M, T>,
    pub(crate) on_drop: Option<DropObserver<T>>,
    pub(crate) owner: Option<Owner>,
}

/// Moves the gate to the stopped state when dropped, however the loop exits.
struct Finish<'a, T> {
    gate: &'a Gate<T>,
    reason: Option<StopReason>,
}

impl<T> Drop for Finish<'_, T> {
    fn drop(&mut self) {
        let reason = self.reason.take().unwrap_or_else(|| {
            StopReason::Failed(ReaderError::Panicked("pump exited abnormally".into()))
        });
        self.gate.finish(reason);
    }
}

impl<M, T> Pump<M, T> {
    /// Run the loop to completion and hand the source back for closing.
    pub(crate) fn run(mut self) -> Box<dyn StreamSource> {
        let gate = self.gate.clone();
        let mut finish = Finish {
            gate: &gate,
            reason: None,
        };
        debug!(lines = self.lines, chunk_size = ?self.chunk_size, "pump started");

        let reason = match panic::catch_unwind(AssertUnwindSafe(|| self.pump())) {
            Ok(reason) => reason,
            Err(payload) => StopReason::Failed(ReaderError::Panicked(panic_message(&*payload))),
        };
        if let StopReason::Failed(e) = &reason {
            warn!("pump failed: {e}");
        }
        let dropped = gate.stats();
        debug!(?reason, dropped = dropped.count, dropped_bytes = dropped.bytes, "pump stopped");

        finish.reason = Some(reason);
        drop(finish);
        self.source
    }

    fn stop_condition(&self) -> Option<StopReason> {
        if self.gate.stop_requested() {
            Some(StopReason::Requested)
        } else if self.source.is_closed() {
            Some(StopReason::SourceClosed)
        } else if self.owner.as_ref().is_some_and(|o| o.strong_count() == 0) {
            Some(StopReason::OwnerDropped)
        } else {
            None
        }
    }

    fn read(&mut self) -> io::Result<Chunk> {
        if self.lines {
            self.source.read_line(self.chunk_size)
        } else {
            self.source.read(self.chunk_size)
        }
    }

    /// Wait out the drop timeout in slices of the poll interval, so that a
    /// closed source or a dropped owner ends the wait as well.
    fn wait_for_space(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while self.gate.is_full() {
            let now = Instant::now();
            if now >= deadline || self.stop_condition().is_some() {
                return;
            }
            let slice = (deadline - now).min(self.poll_interval);
            if self.gate.wait_for_space(slice) {
                return;
            }
        }
    }

    fn pump(&mut self) -> StopReason {
        loop {
            if let Some(reason) = self.stop_condition() {
                return reason;
            }

            let meta = (self.pre_read)();
            let data = match self.read() {
                Ok(Chunk::Data(data)) if data.is_empty() => return StopReason::EndOfStream,
                Ok(Chunk::Data(data)) => data,
                Ok(Chunk::Eof) => return StopReason::EndOfStream,
                Ok(Chunk::TryAgain) => {
                    thread::sleep(self.poll_interval);
                    continue;
                }
                Err(e) if is_transient(&e) => {
                    thread::sleep(self.poll_interval);
                    continue;
                }
                Err(e) => return StopReason::Failed(ReaderError::Read(e)),
            };

            let size = data.len();
            let item = match (self.transform)(meta, data) {
                Ok(item) => item,
                Err(e) => return StopReason::Failed(ReaderError::Transform(e)),
            };

            if let Some(timeout) = self.drop_timeout {
                self.wait_for_space(timeout);
            }
            let outcome = self.gate.put(item, size);
            if let Push::Evicted(_, size) | Push::Dropped(_, size) = &outcome {
                trace!(size, "buffer full, dropped item");
            }
            if let (Some(on_drop), Some((item, _))) = (self.on_drop.as_mut(), outcome.into_dropped())
            {
                on_drop(item);
            }
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
