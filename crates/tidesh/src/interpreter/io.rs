//! Output sinks and input sources threaded through execution
//!
//! Every statement runs against an [`IoContext`] passed down explicitly.
//! Command substitution swaps in a [`Sink::Buffer`] for its own call only,
//! so nested or concurrent substitutions never share a writer.

use std::fs::File;
use std::io::{self, Write};
use std::os::fd::AsFd;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

/// Shared in-memory output buffer.
pub type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// Where a command's output goes.
#[derive(Debug, Clone)]
pub enum Sink {
    /// The shell's own standard output
    Stdout,
    /// The shell's own standard error
    Stderr,
    /// Discard
    Null,
    /// In-memory capture
    Buffer(SharedBuffer),
    /// An open file or pipe write end
    File(Arc<File>),
}

/// How a child process receives one of its output streams.
pub(crate) enum ChildOutput {
    Stdio(Stdio),
    /// Pipe the stream and drain it into the buffer
    Capture(SharedBuffer),
}

impl Sink {
    /// A fresh capture buffer and the sink writing into it.
    pub fn buffer() -> (Sink, SharedBuffer) {
        let buf = SharedBuffer::default();
        (Sink::Buffer(buf.clone()), buf)
    }

    /// Write bytes. A closed reader shows up as [`io::ErrorKind::BrokenPipe`],
    /// which the executor turns into [`Error::BrokenPipe`](crate::Error::BrokenPipe).
    pub fn write_all(&self, data: &[u8]) -> io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        match self {
            Sink::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(data).and_then(|_| out.flush())
            }
            Sink::Stderr => {
                let mut err = io::stderr().lock();
                err.write_all(data).and_then(|_| err.flush())
            }
            Sink::Null => Ok(()),
            Sink::Buffer(buf) => {
                lock(buf).extend_from_slice(data);
                Ok(())
            }
            Sink::File(file) => (&**file).write_all(data),
        }
    }

    /// Write a string.
    pub fn write_str(&self, text: &str) -> io::Result<()> {
        self.write_all(text.as_bytes())
    }

    pub(crate) fn child_output(&self) -> io::Result<ChildOutput> {
        Ok(match self {
            Sink::Stdout => ChildOutput::Stdio(Stdio::from(io::stdout().as_fd().try_clone_to_owned()?)),
            Sink::Stderr => ChildOutput::Stdio(Stdio::from(io::stderr().as_fd().try_clone_to_owned()?)),
            Sink::Null => ChildOutput::Stdio(Stdio::null()),
            Sink::Buffer(buf) => ChildOutput::Capture(buf.clone()),
            Sink::File(file) => ChildOutput::Stdio(Stdio::from(file.try_clone()?)),
        })
    }
}

/// Where a command's input comes from.
#[derive(Debug, Clone)]
pub enum Source {
    /// The shell's own standard input
    Stdin,
    /// Empty input
    Null,
    /// In-memory content (here-documents, here-strings, captured stages)
    Bytes(Arc<Vec<u8>>),
    /// An open file or pipe read end
    File(Arc<File>),
}

/// How a child process receives its standard input.
pub(crate) enum ChildInput {
    Stdio(Stdio),
    /// Pipe the stream and feed it these bytes
    Feed(Arc<Vec<u8>>),
}

impl Source {
    /// Source over in-memory bytes.
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Source::Bytes(Arc::new(data.into()))
    }

    pub(crate) fn child_input(&self) -> io::Result<ChildInput> {
        Ok(match self {
            Source::Stdin => ChildInput::Stdio(Stdio::inherit()),
            Source::Null => ChildInput::Stdio(Stdio::null()),
            Source::Bytes(data) => ChildInput::Feed(data.clone()),
            Source::File(file) => ChildInput::Stdio(Stdio::from(file.try_clone()?)),
        })
    }
}

/// The three standard streams of a running statement.
#[derive(Debug, Clone)]
pub struct IoContext {
    pub stdin: Source,
    pub stdout: Sink,
    pub stderr: Sink,
}

impl IoContext {
    /// The shell's own stdio.
    pub fn inherit() -> Self {
        Self {
            stdin: Source::Stdin,
            stdout: Sink::Stdout,
            stderr: Sink::Stderr,
        }
    }

    /// Empty stdin with stdout and stderr captured into fresh buffers.
    pub fn captured() -> (Self, SharedBuffer, SharedBuffer) {
        let (stdout, out) = Sink::buffer();
        let (stderr, err) = Sink::buffer();
        let io = Self {
            stdin: Source::Null,
            stdout,
            stderr,
        };
        (io, out, err)
    }

    /// Same streams with stdout replaced.
    pub fn with_stdout(&self, stdout: Sink) -> Self {
        Self {
            stdout,
            ..self.clone()
        }
    }

    /// Same streams with stdin replaced.
    pub fn with_stdin(&self, stdin: Source) -> Self {
        Self {
            stdin,
            ..self.clone()
        }
    }

    /// Report a diagnostic on stderr. Failures to write it are dropped.
    pub fn diagnostic(&self, message: &str) {
        let mut line = message.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        let _ = self.stderr.write_str(&line);
    }
}

/// Lock a shared buffer, recovering the data if a writer panicked.
pub(crate) fn lock(buf: &SharedBuffer) -> std::sync::MutexGuard<'_, Vec<u8>> {
    buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Take everything written to a buffer so far as text.
pub fn take_string(buf: &SharedBuffer) -> String {
    let bytes = std::mem::take(&mut *lock(buf));
    String::from_utf8_lossy(&bytes).into_owned()
}
