#![forbid(unsafe_code)]

//! Lock-serialized output.
//!
//! Both writers (`out` and `error`) of one terminal share a single
//! output mutex, so concurrent writers can never interleave inside an
//! escape sequence. [`SyncWriter::write_atomic`] goes one step further:
//! the callback renders into a scratch buffer first and the result is
//! flushed to the backend under one lock hold, making the whole block
//! indivisible with respect to every other write on the same terminal.

use std::fmt;
use std::sync::{Arc, Mutex};

use weft_backend::Backend;
use weft_core::ansi::AnsiWriter;
use weft_core::error::{Error, Result};

/// Which backend sink a writer targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sink {
    Out,
    Error,
}

/// A serialized writer over one backend sink.
#[derive(Clone)]
pub struct SyncWriter {
    backend: Arc<dyn Backend>,
    lock: Arc<Mutex<()>>,
    sink: Sink,
    seven_bit: bool,
}

impl SyncWriter {
    pub(crate) fn new(
        backend: Arc<dyn Backend>,
        lock: Arc<Mutex<()>>,
        sink: Sink,
        seven_bit: bool,
    ) -> Self {
        Self {
            backend,
            lock,
            sink,
            seven_bit,
        }
    }

    fn send(&self, text: &str) -> Result<()> {
        match self.sink {
            Sink::Out => self.backend.write_out(text),
            Sink::Error => self.backend.write_err(text),
        }
    }

    /// Write a string under the output lock.
    pub fn write(&self, text: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.send(text)
    }

    /// Write a string followed by a newline under one lock hold.
    pub fn write_line(&self, text: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.send(text)?;
        self.send("\n")
    }

    /// Render an atomic block.
    ///
    /// The callback receives a buffered [`AnsiWriter`]; nothing reaches
    /// the terminal until the callback returns, then the whole buffer is
    /// flushed under a single lock hold.
    pub fn write_atomic(
        &self,
        f: impl FnOnce(&mut AnsiWriter<&mut String>) -> fmt::Result,
    ) -> Result<()> {
        let mut scratch = String::new();
        let result = if self.seven_bit {
            f(&mut AnsiWriter::new(&mut scratch))
        } else {
            f(&mut AnsiWriter::new(&mut scratch).with_8bit_c1())
        };
        result.map_err(|_| Error::Io(std::io::Error::other("format failure")))?;

        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.send(&scratch)?;
        self.backend.flush()
    }
}

impl fmt::Debug for SyncWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncWriter").field("sink", &self.sink).finish()
    }
}
