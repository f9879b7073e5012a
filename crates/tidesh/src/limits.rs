//! Recursion limits for script execution
//!
//! A shell script can recurse without bound through function calls or nested
//! command substitutions. These limits turn runaway recursion into an error
//! instead of a stack overflow.

use std::time::Duration;

/// Limits and timing knobs for script execution
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    /// Maximum function call depth (recursion limit)
    /// Default: 1000
    pub max_function_depth: usize,

    /// Maximum nesting of command substitutions `$(...)`
    /// Default: 64
    pub max_substitution_depth: usize,

    /// How long a signalled child may take to exit before it is killed
    /// Default: 2 seconds
    pub kill_grace: Duration,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_function_depth: 1000,
            max_substitution_depth: 64,
            kill_grace: Duration::from_secs(2),
        }
    }
}

impl ExecutionLimits {
    /// Create new limits with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum function depth
    pub fn max_function_depth(mut self, depth: usize) -> Self {
        self.max_function_depth = depth;
        self
    }

    /// Set maximum command substitution depth
    pub fn max_substitution_depth(mut self, depth: usize) -> Self {
        self.max_substitution_depth = depth;
        self
    }

    /// Set the grace period between forwarding a signal and force-killing
    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }
}

/// Depth counters tracked while executing
#[derive(Debug, Clone, Default)]
pub struct ExecutionCounters {
    /// Current function call depth
    pub function_depth: usize,

    /// Current command substitution depth
    pub substitution_depth: usize,
}

impl ExecutionCounters {
    /// Create new counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Push function call, returns error if depth exceeded
    pub fn push_function(&mut self, limits: &ExecutionLimits) -> Result<(), LimitExceeded> {
        // Check before incrementing so we don't leave invalid state on failure
        if self.function_depth >= limits.max_function_depth {
            return Err(LimitExceeded::MaxFunctionDepth(limits.max_function_depth));
        }
        self.function_depth += 1;
        Ok(())
    }

    /// Pop function call
    pub fn pop_function(&mut self) {
        if self.function_depth > 0 {
            self.function_depth -= 1;
        }
    }

    /// Enter a command substitution, returns error if depth exceeded
    pub fn push_substitution(&mut self, limits: &ExecutionLimits) -> Result<(), LimitExceeded> {
        if self.substitution_depth >= limits.max_substitution_depth {
            return Err(LimitExceeded::MaxSubstitutionDepth(
                limits.max_substitution_depth,
            ));
        }
        self.substitution_depth += 1;
        Ok(())
    }

    /// Leave a command substitution
    pub fn pop_substitution(&mut self) {
        if self.substitution_depth > 0 {
            self.substitution_depth -= 1;
        }
    }
}

/// Error returned when a resource limit is exceeded
#[derive(Debug, Clone, thiserror::Error)]
pub enum LimitExceeded {
    #[error("maximum function depth exceeded ({0})")]
    MaxFunctionDepth(usize),

    #[error("maximum command substitution depth exceeded ({0})")]
    MaxSubstitutionDepth(usize),
}
