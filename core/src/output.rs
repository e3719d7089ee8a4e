//! Standard stream bindings for supervised processes
//!
//! Child processes write from their own threads of execution while callers
//! read results concurrently, so captured output always goes through
//! [`SafeBuffer`], a mutex-guarded byte buffer that is cheap to clone and
//! safe to share.

use std::io;
use std::sync::{Arc, Mutex};

/// A cloneable, mutex-guarded byte buffer.
///
/// All clones share the same underlying storage. Writes append; reads copy
/// the current contents out, so neither side ever holds the lock across a
/// caller-visible boundary.
#[derive(Debug, Clone, Default)]
pub struct SafeBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SafeBuffer {
    /// Create a new, empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes to the buffer.
    pub fn append(&self, bytes: &[u8]) {
        let mut inner = self.inner.lock().expect("output buffer lock poisoned");
        inner.extend_from_slice(bytes);
    }

    /// Copy out the current contents.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.inner
            .lock()
            .expect("output buffer lock poisoned")
            .clone()
    }

    /// Current contents decoded as UTF-8, with invalid sequences replaced.
    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }

    /// Number of bytes currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("output buffer lock poisoned").len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl io::Write for SafeBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Source for a child process's standard input
#[derive(Debug, Clone)]
pub enum InputSource {
    /// No input; the child reads EOF immediately
    Null,
    /// Inherit the parent's standard input
    Inherit,
    /// Feed the given bytes to the child, then close the stream
    Bytes(Vec<u8>),
}

impl Default for InputSource {
    fn default() -> Self {
        InputSource::Null
    }
}

/// Sink for a child process's standard output or standard error
#[derive(Debug, Clone)]
pub enum OutputSink {
    /// Drop the stream's output
    Discard,
    /// Inherit the parent's stream
    Inherit,
    /// Copy the stream into the given buffer
    Buffer(SafeBuffer),
}

impl Default for OutputSink {
    fn default() -> Self {
        OutputSink::Discard
    }
}

impl OutputSink {
    /// The capture buffer, if this sink has one.
    #[must_use]
    pub fn buffer(&self) -> Option<&SafeBuffer> {
        match self {
            OutputSink::Buffer(buf) => Some(buf),
            _ => None,
        }
    }
}
