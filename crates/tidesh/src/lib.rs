//! Tidesh - expansion and execution engine for a POSIX-style shell
//!
//! Runs parsed scripts the way bash does: word expansion, arithmetic,
//! field splitting and globbing, pipelines of real processes, redirections,
//! control flow and background jobs.
//!
//! # Example
//!
//! ```rust
//! use tidesh::Shell;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut shell = Shell::builder().env("NAME", "world").build();
//!     let result = shell.exec("echo \"hello ${NAME}\"; echo $((6 * 7))").await?;
//!     assert_eq!(result.stdout, "hello world\n42\n");
//!     assert_eq!(result.exit_code, 0);
//!     Ok(())
//! }
//! ```
//!
//! # Custom builtins
//!
//! ```rust
//! use tidesh::{Builtin, BuiltinContext, ExecResult, Shell, async_trait};
//!
//! struct Greet;
//!
//! #[async_trait]
//! impl Builtin for Greet {
//!     async fn execute(&self, ctx: BuiltinContext<'_>) -> tidesh::Result<ExecResult> {
//!         let who = ctx.args.first().map(String::as_str).unwrap_or("nobody");
//!         Ok(ExecResult::ok(format!("hi {who}\n")))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let mut shell = Shell::builder().builtin("greet", Box::new(Greet)).build();
//! assert_eq!(shell.exec("greet you").await?.stdout, "hi you\n");
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! Tidesh emits [`tracing`] events under the `tidesh` target. Variable values
//! matching secret-looking names are redacted and script text is not logged
//! unless [`LogConfig::unsafe_log_scripts`] is set.

mod builtins;
mod error;
mod expand;
mod interpreter;
mod limits;
mod logging_impl;
mod options;
mod parser;

pub use async_trait::async_trait;
pub use builtins::{Builtin, Context as BuiltinContext};
pub use error::{Error, Result};
pub use expand::arithmetic::ArithmeticError;
pub use interpreter::{
    ControlFlow, Environment, ExecResult, IoContext, JobInfo, JobManager, JobStatus, SharedBuffer, Sink, Source,
    VarKind, take_string,
};
pub use limits::{ExecutionLimits, LimitExceeded};
pub use logging_impl::{LogConfig, sanitize_for_log};
pub use options::{ShellOption, ShellOptions};
pub use parser::{Parser, Program, Statement, Word};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use interpreter::Interpreter;

/// Main entry point for Tidesh.
///
/// A `Shell` keeps its variables, functions, options, working directory and
/// job table across calls, like one interactive session.
pub struct Shell {
    interpreter: Interpreter,
    log_config: LogConfig,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell {
    /// Shell inheriting this process's environment and working directory.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new ShellBuilder for customized configuration.
    pub fn builder() -> ShellBuilder {
        ShellBuilder::default()
    }

    /// Execute a script, capturing its output.
    pub async fn exec(&mut self, script: &str) -> Result<ExecResult> {
        let (io, stdout, stderr) = IoContext::captured();
        let exit_code = self.run(script, &io).await?;
        Ok(ExecResult {
            stdout: take_string(&stdout),
            stderr: take_string(&stderr),
            exit_code,
        })
    }

    /// Execute a script against the given streams and return its exit status.
    ///
    /// Only a parse failure is an `Err`; everything that happens while the
    /// script runs ends up in the status and on `io.stderr`.
    pub async fn run(&mut self, script: &str, io: &IoContext) -> Result<i32> {
        tracing::debug!(script = %self.log_config.loggable_script(script), "exec");
        let program = Parser::new(script).parse()?;
        Ok(self.execute(&program, io).await)
    }

    /// Execute an already parsed program.
    pub async fn execute(&mut self, program: &Program, io: &IoContext) -> i32 {
        let status = self.interpreter.execute(program, io).await;
        tracing::debug!(status, "exec finished");
        status
    }

    /// Expand `text` as the body of a double-quoted string.
    pub async fn expand(&mut self, text: &str) -> Result<String> {
        let (io, _, _) = IoContext::captured();
        self.interpreter.expand_text(text, &io).await
    }

    /// Value of a shell variable.
    pub fn get_var(&self, name: &str) -> Option<String> {
        self.interpreter.env.get(name)
    }

    /// Set and export a shell variable.
    pub fn set_var(&mut self, name: &str, value: impl Into<String>) {
        self.interpreter.env.set(name, value);
        self.interpreter.env.export(name);
    }

    /// The shell's variables.
    pub fn env(&self) -> &Environment {
        &self.interpreter.env
    }

    /// Exit status of the last command (`$?`).
    pub fn last_status(&self) -> i32 {
        self.interpreter.last_status
    }

    /// Current working directory.
    pub fn cwd(&self) -> &std::path::Path {
        &self.interpreter.cwd
    }

    /// Shell options in effect.
    pub fn options(&self) -> &ShellOptions {
        &self.interpreter.options
    }

    /// The background job table.
    pub fn jobs(&self) -> &Arc<JobManager> {
        self.interpreter.jobs()
    }
}

/// Builder for customized Shell configuration.
pub struct ShellBuilder {
    inherit_env: bool,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
    script_name: Option<String>,
    args: Vec<String>,
    options: ShellOptions,
    limits: ExecutionLimits,
    log_config: LogConfig,
    builtins: Vec<(String, Box<dyn Builtin>)>,
}

impl Default for ShellBuilder {
    fn default() -> Self {
        Self {
            inherit_env: true,
            env: Vec::new(),
            cwd: None,
            script_name: None,
            args: Vec::new(),
            options: ShellOptions::new(),
            limits: ExecutionLimits::new(),
            log_config: LogConfig::new(),
            builtins: Vec::new(),
        }
    }
}

impl ShellBuilder {
    /// Start from an empty environment instead of the process's.
    pub fn clear_env(mut self) -> Self {
        self.inherit_env = false;
        self
    }

    /// Set an exported environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the current working directory.
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set `$0`.
    pub fn script_name(mut self, name: impl Into<String>) -> Self {
        self.script_name = Some(name.into());
        self
    }

    /// Set the positional parameters `$1..$N`.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Turn on a shell option, as `set -o` or `shopt -s` would.
    pub fn option(mut self, option: ShellOption) -> Self {
        self.options.set(option, true);
        self
    }

    /// Set execution limits.
    pub fn limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// How long an interrupted child gets before it is killed.
    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.limits = self.limits.kill_grace(grace);
        self
    }

    /// Configure what the shell may log.
    pub fn log_config(mut self, config: LogConfig) -> Self {
        self.log_config = config;
        self
    }

    /// Register a custom builtin. Replaces a standard builtin of the same name.
    pub fn builtin(mut self, name: impl Into<String>, builtin: Box<dyn Builtin>) -> Self {
        self.builtins.push((name.into(), builtin));
        self
    }

    /// Build the Shell instance.
    pub fn build(self) -> Shell {
        let mut env = if self.inherit_env {
            Environment::from_process_env()
        } else {
            Environment::new()
        };
        for (key, value) in &self.env {
            env.set(key, value.as_str());
            env.export(key);
        }
        if let Some(name) = self.script_name {
            env.set_script_name(name);
        }
        env.set_positional(self.args);

        let cwd = self
            .cwd
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"));
        env.set("PWD", cwd.to_string_lossy().into_owned());

        let mut builtins = builtins::default_builtins();
        for (name, builtin) in self.builtins {
            builtins.insert(name, Arc::from(builtin));
        }

        let interpreter = Interpreter::new(
            env,
            cwd,
            self.options,
            self.limits,
            self.log_config.clone(),
            builtins,
        );
        Shell {
            interpreter,
            log_config: self.log_config,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn shell() -> Shell {
        let mut builder = Shell::builder().clear_env().cwd(std::env::temp_dir());
        if let Ok(path) = std::env::var("PATH") {
            builder = builder.env("PATH", path);
        }
        builder.build()
    }

    #[tokio::test]
    async fn test_echo_hello() {
        let mut sh = shell();
        let result = sh.exec("echo hello").await.unwrap();
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn test_variable_expansion() {
        let mut sh = Shell::builder().clear_env().env("HOME", "/home/user").build();
        let result = sh.exec("echo $HOME").await.unwrap();
        assert_eq!(result.stdout, "/home/user\n");
    }

    #[tokio::test]
    async fn test_state_persists_between_calls() {
        let mut sh = shell();
        sh.exec("greeting=hi; shout() { echo \"$1!\"; }").await.unwrap();
        let result = sh.exec("shout $greeting").await.unwrap();
        assert_eq!(result.stdout, "hi!\n");
        assert_eq!(sh.get_var("greeting").as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_parse_error_is_err() {
        let mut sh = shell();
        assert!(matches!(sh.exec("if true; then").await, Err(Error::Parse(_) | Error::ParseAt { .. })));
    }

    #[tokio::test]
    async fn test_exit_status() {
        let mut sh = shell();
        let result = sh.exec("echo before; exit 3; echo after").await.unwrap();
        assert_eq!(result.stdout, "before\n");
        assert_eq!(result.exit_code, 3);
        assert_eq!(sh.last_status(), 3);
    }

    #[tokio::test]
    async fn test_args_and_script_name() {
        let mut sh = Shell::builder().clear_env().script_name("demo.sh").args(["a", "b c"]).build();
        let result = sh.exec("echo \"$0 $# $2\"").await.unwrap();
        assert_eq!(result.stdout, "demo.sh 2 b c\n");
    }

    #[tokio::test]
    async fn test_expand_api() {
        let mut sh = Shell::builder().clear_env().env("X", "abc").build();
        assert_eq!(sh.expand("${X^^}-$((1 + 2))").await.unwrap(), "ABC-3");
    }

    #[tokio::test]
    async fn test_custom_builtin_overrides() {
        struct Loud;

        #[async_trait]
        impl Builtin for Loud {
            async fn execute(&self, ctx: BuiltinContext<'_>) -> Result<ExecResult> {
                Ok(ExecResult::ok(format!("{}\n", ctx.args.join(" ").to_uppercase())))
            }
        }

        let mut sh = Shell::builder().clear_env().builtin("echo", Box::new(Loud)).build();
        assert_eq!(sh.exec("echo quiet words").await.unwrap().stdout, "QUIET WORDS\n");
    }
}
