//! Interpreter state types

use serde::Serialize;

/// Control flow signals raised by `break`, `continue`, `return` and `exit`.
///
/// These travel alongside `Ok(..)` results rather than as errors so that a
/// loop can tell "stop because of break" apart from a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlFlow {
    /// Keep going
    #[default]
    Normal,
    /// Leave N enclosing loops
    Break(u32),
    /// Skip to the next iteration of the Nth enclosing loop
    Continue(u32),
    /// Leave the current function with a status
    Return(i32),
    /// Stop the script with a status
    Exit(i32),
}

impl ControlFlow {
    /// Whether execution should continue with the next statement.
    pub fn is_normal(self) -> bool {
        matches!(self, ControlFlow::Normal)
    }
}

/// Result of executing a script or builtin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecResult {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code
    pub exit_code: i32,
}

impl ExecResult {
    /// Create a successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    /// Create a failed result with the given stderr.
    pub fn err(stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// A result with only an exit code.
    pub fn status(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::default()
        }
    }

    /// Check if the result indicates success.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}
