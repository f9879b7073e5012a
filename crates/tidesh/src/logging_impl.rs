//! Logging configuration for Tidesh
//!
//! The engine emits `tracing` events at these levels:
//!
//! - **WARN**: recoverable plumbing failures (a drain task failed, a signal
//!   could not be forwarded)
//! - **DEBUG**: statement dispatch, process spawn/exit, job lifecycle,
//!   variable assignment
//! - **TRACE**: expansion results and redirect wiring
//!
//! Variable values and script text pass through [`LogConfig`] before they are
//! logged so that secrets exported into a script do not end up in log files.

use std::borrow::Cow;
use std::collections::HashSet;

/// Configuration for what the engine is allowed to put in log events
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to redact values of secret-looking variables (default: true)
    pub redact_sensitive: bool,

    /// Variable name fragments whose values are redacted (case-insensitive)
    pub redact_var_patterns: HashSet<String>,

    /// Whether to include script text in logs (default: false)
    pub log_script_content: bool,

    /// Maximum length of logged values before truncation (default: 200)
    pub max_value_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        let redact_var_patterns = [
            "PASSWORD",
            "PASSWD",
            "SECRET",
            "TOKEN",
            "KEY",
            "CREDENTIAL",
            "AUTH",
            "PRIVATE",
            "SESSION",
            "COOKIE",
            "DATABASE_URL",
            "CONNECTION_STRING",
        ]
        .iter()
        .map(|p| p.to_string())
        .collect();

        Self {
            redact_sensitive: true,
            redact_var_patterns,
            log_script_content: false,
            max_value_length: 200,
        }
    }
}

impl LogConfig {
    /// Create a new log configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable redaction of variable values
    pub fn unsafe_disable_redaction(mut self) -> Self {
        self.redact_sensitive = false;
        self
    }

    /// Add a variable-name fragment whose values should be redacted
    pub fn redact_var(mut self, pattern: &str) -> Self {
        self.redact_var_patterns.insert(pattern.to_uppercase());
        self
    }

    /// Log full script text instead of a size summary
    pub fn unsafe_log_scripts(mut self) -> Self {
        self.log_script_content = true;
        self
    }

    /// Set maximum length for logged values
    pub fn max_value_length(mut self, len: usize) -> Self {
        self.max_value_length = len;
        self
    }

    /// Check if a variable's value must not be logged
    pub fn should_redact_var(&self, name: &str) -> bool {
        if !self.redact_sensitive {
            return false;
        }
        let upper = name.to_uppercase();
        self.redact_var_patterns
            .iter()
            .any(|pattern| upper.contains(pattern))
    }

    /// Value of `name=value` as it may appear in a log event
    pub fn loggable_value<'a>(&self, name: &str, value: &'a str) -> Cow<'a, str> {
        if self.should_redact_var(name) {
            return Cow::Borrowed("[REDACTED]");
        }
        self.truncate(value)
    }

    /// Script text (or a summary of it) as it may appear in a log event
    pub fn loggable_script(&self, script: &str) -> String {
        if !self.log_script_content {
            return format!(
                "[script: {} lines, {} bytes]",
                script.lines().count(),
                script.len()
            );
        }
        let sanitized = sanitize_for_log(script);
        self.truncate(&sanitized).into_owned()
    }

    /// Truncate value if it exceeds max length, respecting char boundaries
    fn truncate<'a>(&self, value: &'a str) -> Cow<'a, str> {
        if value.len() <= self.max_value_length {
            Cow::Borrowed(value)
        } else {
            let mut end = self.max_value_length;
            while end > 0 && !value.is_char_boundary(end) {
                end -= 1;
            }
            Cow::Owned(format!(
                "{}...[truncated {} bytes]",
                &value[..end],
                value.len() - end
            ))
        }
    }
}

/// Escape control characters so one log event stays on one line
pub fn sanitize_for_log(input: &str) -> String {
    input
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
        .chars()
        .filter(|c| !c.is_control() || *c == ' ')
        .collect()
}
