//! Errors reported by the [Reader](crate::Reader) and its pump.

use std::io;
use thiserror::Error;

/// Error type returned by hooks that may fail.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures of the pump thread or of the reader's setup and teardown.
#[derive(Error, Debug)]
pub enum ReaderError {
    /// Failed to spawn the pump thread.
    #[error("Failed to spawn pump thread.")]
    Spawn(#[source] io::Error),
    /// The source failed with an error that is not transient.
    #[error("Failed to read from source: {0}")]
    Read(#[source] io::Error),
    /// The transform hook rejected a chunk.
    #[error("Failed to transform chunk: {0}")]
    Transform(#[source] BoxError),
    /// A hook or the source panicked on the pump thread.
    #[error("Pump thread panicked: {0}")]
    Panicked(String),
    /// Closing the source after the pump was joined failed.
    #[error("Failed to close source: {0}")]
    Close(#[source] io::Error),
}
