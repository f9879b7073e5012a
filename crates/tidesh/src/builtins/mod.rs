//! Built-in shell commands
//!
//! This module provides the [`Builtin`] trait for commands that run inside
//! the shell process and the [`Context`] they run with. Only the commands
//! the engine needs to be usable on its own live here; anything else is an
//! external program or a custom builtin registered through
//! [`ShellBuilder::builtin`](crate::ShellBuilder::builtin).
//!
//! ```rust
//! use tidesh::{Builtin, BuiltinContext, ExecResult, async_trait};
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl Builtin for Hello {
//!     async fn execute(&self, ctx: BuiltinContext<'_>) -> tidesh::Result<ExecResult> {
//!         let who = ctx.env.get("USER").unwrap_or_else(|| "world".to_string());
//!         Ok(ExecResult::ok(format!("hello {who}\n")))
//!     }
//! }
//! ```

mod echo;
mod flow;
mod jobs;
mod navigation;
mod vars;

pub use echo::Echo;
pub use flow::{Colon, Exit, False, True};
pub use jobs::{Bg, Fg, Jobs, Wait};
pub use navigation::{Cd, Pwd};
pub use test::{Bracket, Test};
pub use vars::{Declare, Export, Local, Set, Shift, Shopt, Unset};

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::interpreter::{Environment, ExecResult, JobManager};
use crate::options::ShellOptions;

/// Resolve `path_str` against `cwd` and normalize `.` and `..`.
pub fn resolve_path(cwd: &Path, path_str: &str) -> PathBuf {
    let path = Path::new(path_str);
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };

    let mut result = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::RootDir => result.push("/"),
            Component::Normal(name) => result.push(name),
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir | Component::Prefix(_) => {}
        }
    }
    if result.as_os_str().is_empty() {
        result.push("/");
    }
    result
}

/// Execution context for builtin commands.
pub struct Context<'a> {
    /// Command arguments (not including the command name).
    ///
    /// For `mycommand arg1 arg2`, this contains `["arg1", "arg2"]`.
    pub args: &'a [String],

    /// Shell variables, arrays and positional parameters.
    ///
    /// [`Environment::get`], [`Environment::set`] and
    /// [`Environment::snapshot`] give name lookup, assignment and a
    /// point-in-time copy of every variable.
    pub env: &'a mut Environment,

    /// Shell options (`set -e`, `shopt -s nullglob`, ...).
    pub options: &'a mut ShellOptions,

    /// Current working directory (mutable).
    ///
    /// Used by `cd` and path resolution.
    pub cwd: &'a mut PathBuf,

    /// Background job registry.
    pub jobs: &'a Arc<JobManager>,

    /// Exit status of the previous command (`$?`).
    pub last_status: i32,
}

/// Trait for implementing builtin commands.
///
/// The trait requires `Send + Sync` so builtins can be shared with
/// background jobs.
///
/// Return [`ExecResult::ok`] for success with output, or
/// [`ExecResult::err`] for a failure with a message and exit code.
/// `Err(Error::Exit(code))` asks the shell to exit and is passed through
/// untouched; any other `Err` is reported as a failed command.
#[async_trait]
pub trait Builtin: Send + Sync {
    /// Execute the builtin command.
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult>;
}

/// Registry of builtin commands by name.
pub type BuiltinMap = HashMap<String, Arc<dyn Builtin>>;

/// The standard builtin set.
pub fn default_builtins() -> BuiltinMap {
    let mut map: BuiltinMap = HashMap::new();
    let mut add = |name: &str, builtin: Arc<dyn Builtin>| {
        map.insert(name.to_string(), builtin);
    };
    add(":", Arc::new(Colon));
    add("true", Arc::new(True));
    add("false", Arc::new(False));
    add("exit", Arc::new(Exit));
    add("echo", Arc::new(Echo));
    add("cd", Arc::new(Cd));
    add("pwd", Arc::new(Pwd));
    add("export", Arc::new(Export));
    add("unset", Arc::new(Unset));
    add("local", Arc::new(Local));
    add("declare", Arc::new(Declare));
    add("typeset", Arc::new(Declare));
    add("shift", Arc::new(Shift));
    add("set", Arc::new(Set));
    add("shopt", Arc::new(Shopt));
    add("test", Arc::new(Test));
    add("[", Arc::new(Bracket));
    add("jobs", Arc::new(Jobs));
    add("wait", Arc::new(Wait));
    add("fg", Arc::new(Fg));
    add("bg", Arc::new(Bg));
    map
}

/// Fixture for builtin unit tests.
#[cfg(test)]
pub(crate) struct TestShell {
    pub env: Environment,
    pub options: ShellOptions,
    pub cwd: PathBuf,
    pub jobs: Arc<JobManager>,
}

#[cfg(test)]
impl TestShell {
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
            options: ShellOptions::new(),
            cwd: PathBuf::from("/"),
            jobs: Arc::new(JobManager::new()),
        }
    }

    pub async fn run(&mut self, builtin: &dyn Builtin, args: &[&str]) -> Result<ExecResult> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let ctx = Context {
            args: &args,
            env: &mut self.env,
            options: &mut self.options,
            cwd: &mut self.cwd,
            jobs: &self.jobs,
            last_status: 0,
        };
        builtin.execute(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path() {
        assert_eq!(resolve_path(Path::new("/home"), "/etc/passwd"), PathBuf::from("/etc/passwd"));
        assert_eq!(resolve_path(Path::new("/home"), "file.txt"), PathBuf::from("/home/file.txt"));
        assert_eq!(resolve_path(Path::new("/tmp/a"), "../b/./c"), PathBuf::from("/tmp/b/c"));
        assert_eq!(resolve_path(Path::new("/"), ".."), PathBuf::from("/"));
    }

    #[test]
    fn test_default_set() {
        let map = default_builtins();
        for name in [":", "echo", "[", "typeset", "bg", "fg", "wait", "shopt"] {
            assert!(map.contains_key(name), "missing {name}");
        }
        assert!(!map.contains_key("eval"));
    }
}
