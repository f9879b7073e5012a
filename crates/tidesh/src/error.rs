//! Error types for Tidesh
//!
//! Errors are split by how the executor reacts to them:
//! - command-level failures (not found, redirect, pipe, arithmetic) are
//!   reported on the diagnostic stream and turned into an exit status
//! - script-level failures (unbound variable, `${var:?}`, interrupt) stop
//!   the running script
//! - [`Error::BrokenPipe`] ends the pipeline stage that wrote into a closed
//!   pipe, with the status a process killed by SIGPIPE reports
//! - [`Error::Exit`] is the `exit` request and is never wrapped
//!
//! Control flow (`break`, `continue`, `return`) is not an error; see
//! [`ControlFlow`](crate::ControlFlow).

use crate::expand::arithmetic::ArithmeticError;
use crate::limits::LimitExceeded;
use thiserror::Error;

/// Result type alias using Tidesh's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Tidesh error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Parse error occurred while parsing the script (without location info).
    #[error("parse error: {0}")]
    Parse(String),

    /// Parse error with source location information.
    #[error("parse error at line {line}, column {column}: {message}")]
    ParseAt {
        message: String,
        line: usize,
        column: usize,
    },

    /// No builtin, function, or executable matched the command name.
    #[error("{0}: command not found")]
    CommandNotFound(String),

    /// A command ran but could not complete (spawn or wait failure).
    #[error("{name}: {message}")]
    CommandFailed {
        name: String,
        message: String,
        code: i32,
    },

    /// A redirection could not be set up.
    #[error("{0}")]
    Redirect(String),

    /// Pipe creation or wiring failed.
    #[error("pipe error: {0}")]
    Pipe(String),

    /// Reference to an unset variable while `set -u` is active.
    #[error("{0}: unbound variable")]
    UnboundVariable(String),

    /// `${var:?message}` on an unset or empty variable.
    #[error("{name}: {message}")]
    Parameter { name: String, message: String },

    /// Arithmetic evaluation failed.
    #[error("{0}")]
    Arithmetic(#[from] ArithmeticError),

    /// Malformed expansion such as a bad substitution or negative substring length.
    #[error("{0}")]
    InvalidExpression(String),

    /// A foreground child was interrupted by a signal forwarded from the shell.
    #[error("interrupted by signal {signal}")]
    Interrupted { signal: i32 },

    /// The `exit` builtin requested termination with a status.
    ///
    /// Propagates through the executor untouched; only the top-level entry
    /// point turns it into a final exit code.
    #[error("exit requested with status {0}")]
    Exit(i32),

    /// A write found the reading end of its pipe closed.
    #[error("broken pipe")]
    BrokenPipe,

    /// I/O error from redirections or process plumbing.
    #[error("io error: {0}")]
    Io(#[source] std::io::Error),

    /// Resource limit exceeded.
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(#[from] LimitExceeded),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::BrokenPipe => Error::BrokenPipe,
            _ => Error::Io(e),
        }
    }
}

impl Error {
    /// Create a parse error with source location.
    pub fn parse_at(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self::ParseAt {
            message: message.into(),
            line,
            column,
        }
    }

    /// Exit status a shell reports for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::CommandNotFound(_) => 127,
            Error::CommandFailed { code, .. } => *code,
            Error::Interrupted { signal } => 128 + signal,
            Error::BrokenPipe => 128 + nix::sys::signal::Signal::SIGPIPE as i32,
            Error::Exit(code) => *code,
            Error::Parse(_) | Error::ParseAt { .. } => 2,
            _ => 1,
        }
    }

    /// Whether this error stops the whole script rather than one command.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::UnboundVariable(_)
                | Error::Parameter { .. }
                | Error::Interrupted { .. }
                | Error::BrokenPipe
                | Error::Exit(_)
                | Error::ResourceLimit(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::CommandNotFound("nope".into()).exit_code(), 127);
        assert_eq!(Error::Interrupted { signal: 2 }.exit_code(), 130);
        assert_eq!(Error::Exit(42).exit_code(), 42);
        assert_eq!(Error::Redirect("x".into()).exit_code(), 1);
        assert_eq!(
            Error::Arithmetic(ArithmeticError::DivisionByZero).exit_code(),
            1
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::UnboundVariable("X".into()).is_fatal());
        assert!(Error::Exit(0).is_fatal());
        assert!(!Error::CommandNotFound("x".into()).is_fatal());
        assert!(!Error::Redirect("x".into()).is_fatal());
    }

    #[test]
    fn test_broken_pipe_from_io() {
        let err = Error::from(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(matches!(err, Error::BrokenPipe));
        assert_eq!(err.exit_code(), 141);
        assert!(err.is_fatal());
        let err = Error::from(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            Error::CommandNotFound("frob".into()).to_string(),
            "frob: command not found"
        );
        assert_eq!(
            Error::UnboundVariable("FOO".into()).to_string(),
            "FOO: unbound variable"
        );
    }
}
