//! Consumer side: the [Reader] and the [Builder] that spawns it.

use std::any::Any;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::warn;

use crate::buffer::{DropStats, Overflow};
use crate::config::Config;
use crate::error::{BoxError, ReaderError};
use crate::gate::Gate;
use crate::pump::{DropObserver, Owner, PreRead, Pump, StopReason, Transform};
use crate::source::StreamSource;

/// Builder for a [Reader] that yields items of type `T`.
///
/// `M` is the type returned by the [pre_read](Builder::pre_read) hook and
/// handed to the [transform](Builder::map) together with the data.
pub struct Builder<M = (), T = Vec<u8>> {
    config: Config,
    pre_read: PreRead<M>,
    transform: Transform<M, T>,
    on_drop: Option<DropObserver<T>>,
    owner: Option<Owner>,
}

impl Builder {
    /// Builder yielding the raw chunks read from the source.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Builder {
            config,
            pre_read: Box::new(|| ()),
            transform: Box::new(|(), data: Vec<u8>| Ok::<_, BoxError>(data)),
            on_drop: None,
            owner: None,
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: 'static, T: Send + 'static> Builder<M, T> {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Maximum number of buffered items, `0` for no limit.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = Some(size);
        self
    }

    /// Read line by line.
    pub fn lines(mut self, lines: bool) -> Self {
        self.config.lines = lines;
        self
    }

    /// Wait up to `timeout` for space before applying the overflow policy.
    pub fn drop_timeout(mut self, timeout: Duration) -> Self {
        self.config.drop_timeout = Some(timeout);
        self
    }

    pub fn overflow(mut self, overflow: Overflow) -> Self {
        self.config.overflow = overflow;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Call `f` before every read and pair its result with the data read.
    ///
    /// Without a [transform](Builder::map) the reader yields `(meta, data)`.
    /// Resets the transform and the drop observer, so call this first.
    pub fn pre_read<N: Send + 'static>(
        self,
        f: impl FnMut() -> N + Send + 'static,
    ) -> Builder<N, (N, Vec<u8>)> {
        Builder {
            config: self.config,
            pre_read: Box::new(f),
            transform: Box::new(|meta: N, data: Vec<u8>| Ok::<_, BoxError>((meta, data))),
            on_drop: None,
            owner: self.owner,
        }
    }

    /// Turn every chunk into an item before it is buffered.
    ///
    /// Resets the drop observer.
    pub fn map<U: Send + 'static>(
        self,
        mut f: impl FnMut(M, Vec<u8>) -> U + Send + 'static,
    ) -> Builder<M, U> {
        self.try_map(move |meta, data| Ok::<_, BoxError>(f(meta, data)))
    }

    /// Like [map](Builder::map), but an error stops the pump with
    /// [ReaderError::Transform].
    pub fn try_map<U, E>(
        self,
        mut f: impl FnMut(M, Vec<u8>) -> Result<U, E> + Send + 'static,
    ) -> Builder<M, U>
    where
        U: Send + 'static,
        E: Into<BoxError>,
    {
        Builder {
            config: self.config,
            pre_read: self.pre_read,
            transform: Box::new(move |meta: M, data: Vec<u8>| {
                f(meta, data).map_err(Into::<BoxError>::into)
            }),
            on_drop: None,
            owner: self.owner,
        }
    }

    /// Hand every item lost to the overflow policy to `f`.
    ///
    /// Called on the pump thread, never while the buffer is locked.
    pub fn on_drop(mut self, f: impl FnMut(T) + Send + 'static) -> Self {
        self.on_drop = Some(Box::new(f));
        self
    }

    /// Stop pumping once `owner` has no strong references left.
    pub fn owner<O: Any + Send + Sync>(mut self, owner: &Arc<O>) -> Self {
        let weak: Weak<O> = Arc::downgrade(owner);
        self.owner = Some(weak);
        self
    }

    /// Start the pump thread on `source`.
    pub fn spawn<S: StreamSource + 'static>(self, source: S) -> Result<Reader<T>, ReaderError> {
        let capacity = self.config.capacity;
        let gate = Arc::new(Gate::new(capacity, self.config.overflow));
        let pump = Pump {
            source: Box::new(source),
            gate: gate.clone(),
            chunk_size: self.config.chunk_size,
            lines: self.config.lines,
            drop_timeout: self.config.drop_timeout,
            poll_interval: self.config.poll_interval,
            pre_read: self.pre_read,
            transform: self.transform,
            on_drop: self.on_drop,
            owner: self.owner,
        };

        let worker = thread::Builder::new()
            .name("nonblocking-pump".into())
            .spawn(move || pump.run())
            .map_err(ReaderError::Spawn)?;

        Ok(Reader {
            gate,
            worker: Some(worker),
            capacity,
        })
    }
}

/// Non-blocking view of a blocking [StreamSource].
///
/// A background thread reads the source and fills a bounded buffer. The
/// reader can be shared between threads; all of its methods take `&self`
/// except [close](Reader::close).
///
/// Dropping the reader stops the pump, joins the thread, and closes the
/// source. Joining waits for a read that is in flight.
pub struct Reader<T> {
    gate: Arc<Gate<T>>,
    worker: Option<JoinHandle<Box<dyn StreamSource>>>,
    capacity: usize,
}

impl Reader<Vec<u8>> {
    /// Pump `source` with the default [Config].
    pub fn new<S: StreamSource + 'static>(source: S) -> Result<Self, ReaderError> {
        Builder::new().spawn(source)
    }

    pub fn builder() -> Builder {
        Builder::new()
    }
}

impl<T> Reader<T> {
    /// Take the oldest buffered item, if any. Never blocks.
    pub fn read_one(&self) -> Option<T> {
        self.gate.get_one()
    }

    /// Take up to `max` buffered items (all if `None`), oldest first.
    pub fn read_many(&self, max: Option<usize>) -> Vec<T> {
        self.gate.drain(max)
    }

    /// Iterate over the items buffered right now without blocking.
    pub fn try_iter(&self) -> TryIter<'_, T> {
        TryIter { reader: self }
    }

    /// Wait for the next item.
    ///
    /// Returns `None` once the pump stopped and the buffer is empty.
    pub fn recv(&self) -> Option<T> {
        self.gate.recv(None)
    }

    /// Like [recv](Reader::recv), but gives up after `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        self.gate.recv(Some(timeout))
    }

    /// Blocking iterator that ends after the pump stopped and the last
    /// buffered item was returned.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { reader: self }
    }

    /// Wait until an item is buffered or the pump stopped.
    ///
    /// Returns the number of buffered items, also when `timeout` elapsed.
    pub fn block(&self, timeout: Option<Duration>) -> usize {
        self.block_until(1, timeout)
    }

    /// Wait until `threshold` items are buffered or the pump stopped.
    pub fn block_until(&self, threshold: usize, timeout: Option<Duration>) -> usize {
        self.gate.block(threshold, timeout)
    }

    /// Whether the pump is still running.
    ///
    /// Once this is `false`, the buffered items are the final batch.
    pub fn is_pumping(&self) -> bool {
        self.gate.is_running() && self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Items lost to the overflow policy so far.
    pub fn dropped(&self) -> DropStats {
        self.gate.stats()
    }

    /// Like [dropped](Reader::dropped), and reset the counters in the same step.
    pub fn take_dropped(&self) -> DropStats {
        self.gate.take_stats()
    }

    /// Ask the pump to stop before its next read. Does not wait.
    pub fn stop(&self) {
        self.gate.request_stop();
    }

    /// Stop the pump, wait for the thread, and close the source.
    ///
    /// Buffered items stay readable. Calling it again does nothing.
    pub fn close(&mut self) -> Result<(), ReaderError> {
        self.gate.request_stop();
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        match worker.join() {
            Ok(mut source) => source.close().map_err(ReaderError::Close),
            Err(_) => {
                self.gate.finish(StopReason::Failed(ReaderError::Panicked(
                    "pump thread panicked".into(),
                )));
                Ok(())
            }
        }
    }

    /// Why the pump stopped, `None` while it is running.
    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.gate.reason()
    }

    /// The error that ended the pump, if it failed.
    pub fn failure(&self) -> Option<&ReaderError> {
        match self.stop_reason() {
            Some(StopReason::Failed(e)) => Some(e),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.gate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of buffered items, `0` if unbounded.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Drop for Reader<T> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("closing reader: {e}");
        }
    }
}

impl<'a, T> IntoIterator for &'a Reader<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

/// Non-blocking iterator returned by [Reader::try_iter].
pub struct TryIter<'a, T> {
    reader: &'a Reader<T>,
}

impl<T> Iterator for TryIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.reader.read_one()
    }
}

/// Blocking iterator returned by [Reader::iter].
pub struct Iter<'a, T> {
    reader: &'a Reader<T>,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.reader.recv()
    }
}
