//! Control-flow executor
//!
//! Walks the AST statement by statement. Every statement returns a
//! [`ControlFlow`] so that `break`, `continue`, `return` and `exit` travel
//! alongside ordinary results instead of through the error channel.
//!
//! Errors come in two weights. Command-level failures (command not found,
//! bad redirect, arithmetic error) are reported on the diagnostic stream and
//! become the command's exit status; the script goes on. Script-level
//! failures ([`Error::is_fatal`]) unwind to the nearest subshell boundary or
//! to the top.

mod environment;
mod io;
mod jobs;
pub(crate) mod process;
mod redirect;
mod state;

pub use environment::{Environment, FunctionScope, VarKind};
pub use io::{IoContext, SharedBuffer, Sink, Source, take_string};
pub use jobs::{JobInfo, JobManager, JobStatus};
pub use process::{continue_group, find_executable, status_code};
pub use state::{ControlFlow, ExecResult};

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tempfile::TempPath;

use crate::builtins::{Builtin, BuiltinMap, Context};
use crate::error::{Error, Result};
use crate::limits::{ExecutionCounters, ExecutionLimits};
use crate::logging_impl::LogConfig;
use crate::options::{ShellOption, ShellOptions};
use crate::parser::{
    AndOrList, AndOrOp, ArithForStatement, Assignment, AssignmentValue, BackgroundStatement, BlockStatement,
    CaseStatement, CaseTerminator, CommandStatement, ForStatement, IfStatement, LoopControl, Parser, Pipeline,
    ReturnStatement, Statement, WhileStatement, Word,
};
use io::lock;
use process::{Running, SpawnRequest, track_background, wait_foreground};

/// A `<(...)` or `>(...)` backing file, kept until the command using it
/// finishes.
pub(crate) struct PendingSubstitution {
    pub path: TempPath,
    /// Reader for `>(...)`; `None` for `<(...)`
    pub program: Option<crate::parser::Program>,
}

/// What a loop does after one run of its body.
fn after_body(flow: ControlFlow) -> Option<ControlFlow> {
    match flow {
        ControlFlow::Normal | ControlFlow::Continue(1) => None,
        ControlFlow::Break(1) => Some(ControlFlow::Normal),
        ControlFlow::Break(n) => Some(ControlFlow::Break(n - 1)),
        ControlFlow::Continue(n) => Some(ControlFlow::Continue(n - 1)),
        other => Some(other),
    }
}

/// Exit status of a forked interpreter after it ran.
///
/// A fork that wrote into a closed pipe ends quietly, like a process
/// killed by SIGPIPE.
fn fork_status(sub: &Interpreter, outcome: Result<ControlFlow>, io: &IoContext) -> Result<i32> {
    match outcome {
        Ok(ControlFlow::Exit(code)) => Ok(code),
        Ok(_) => Ok(sub.last_status),
        Err(e @ Error::Interrupted { .. }) => Err(e),
        Err(Error::Exit(code)) => Ok(code),
        Err(e @ Error::BrokenPipe) => {
            tracing::debug!("stage stopped on broken pipe");
            Ok(e.exit_code())
        }
        Err(e) => {
            io.diagnostic(&format!("tidesh: {e}"));
            Ok(e.exit_code())
        }
    }
}

fn new_pipe() -> Result<(Source, Sink)> {
    let (reader, writer) = std::io::pipe().map_err(|e| Error::Pipe(e.to_string()))?;
    let reader = File::from(OwnedFd::from(reader));
    let writer = File::from(OwnedFd::from(writer));
    Ok((Source::File(Arc::new(reader)), Sink::File(Arc::new(writer))))
}

/// Interpreter state.
pub struct Interpreter {
    pub(crate) env: Environment,
    pub(crate) functions: HashMap<String, Arc<Statement>>,
    pub(crate) options: ShellOptions,
    pub(crate) cwd: PathBuf,
    pub(crate) last_status: i32,
    builtins: Arc<BuiltinMap>,
    pub(crate) jobs: Arc<JobManager>,
    pub(crate) limits: ExecutionLimits,
    pub(crate) counters: ExecutionCounters,
    log_config: Arc<LogConfig>,
    /// Nesting of `if`/`while` conditions and non-final `&&`/`||` elements,
    /// where `set -e` does not apply
    condition_depth: usize,
    /// Enclosing loops of the current function body
    loop_depth: usize,
    source_depth: usize,
    pub(crate) shell_pid: u32,
    /// Running as a background job: children are not sent our signals
    background: bool,
    /// Status of the last command substitution in the current command
    pub(crate) last_substitution_status: Option<i32>,
    pub(crate) pending_substitutions: Vec<PendingSubstitution>,
}

impl Interpreter {
    /// Create an interpreter.
    pub(crate) fn new(
        env: Environment,
        cwd: PathBuf,
        options: ShellOptions,
        limits: ExecutionLimits,
        log_config: LogConfig,
        builtins: BuiltinMap,
    ) -> Self {
        Self {
            env,
            functions: HashMap::new(),
            options,
            cwd,
            last_status: 0,
            builtins: Arc::new(builtins),
            jobs: Arc::new(JobManager::new()),
            limits,
            counters: ExecutionCounters::new(),
            log_config: Arc::new(log_config),
            condition_depth: 0,
            loop_depth: 0,
            source_depth: 0,
            shell_pid: std::process::id(),
            background: false,
            last_substitution_status: None,
            pending_substitutions: Vec::new(),
        }
    }

    /// Fork for a subshell, pipeline stage, substitution or background job.
    ///
    /// The fork shares the job table and builtins; variables, functions,
    /// options and cwd are copies.
    pub(crate) fn subshell(&self) -> Interpreter {
        Interpreter {
            env: self.env.clone(),
            functions: self.functions.clone(),
            options: self.options.clone(),
            cwd: self.cwd.clone(),
            last_status: self.last_status,
            builtins: self.builtins.clone(),
            jobs: self.jobs.clone(),
            limits: self.limits.clone(),
            counters: self.counters.clone(),
            log_config: self.log_config.clone(),
            condition_depth: self.condition_depth,
            loop_depth: 0,
            source_depth: self.source_depth,
            shell_pid: self.shell_pid,
            background: self.background,
            last_substitution_status: None,
            pending_substitutions: Vec::new(),
        }
    }

    /// The shared job table.
    pub fn jobs(&self) -> &Arc<JobManager> {
        &self.jobs
    }

    /// Run a parsed program and return its final exit status.
    ///
    /// Script-level errors are reported on `io.stderr` and turn into the
    /// returned status; an `exit` request ends the program with its code.
    pub async fn execute(&mut self, program: &crate::parser::Program, io: &IoContext) -> i32 {
        tracing::debug!(statements = program.statements.len(), "executing program");
        match self.execute_statements(&program.statements, io).await {
            Ok(ControlFlow::Exit(code)) | Err(Error::Exit(code)) => self.last_status = code,
            Ok(_) => {}
            Err(e @ Error::BrokenPipe) => self.last_status = e.exit_code(),
            Err(e) => {
                io.diagnostic(&format!("tidesh: {e}"));
                self.last_status = e.exit_code();
            }
        }
        if let Err(e) = self.finish_process_substitutions(io).await {
            tracing::warn!(error = %e, "process substitution cleanup failed");
        }
        self.last_status
    }

    pub(crate) async fn execute_statements(&mut self, statements: &[Statement], io: &IoContext) -> Result<ControlFlow> {
        for statement in statements {
            let flow = self.execute_statement(statement, io).await?;
            if !flow.is_normal() {
                return Ok(flow);
            }
        }
        Ok(ControlFlow::Normal)
    }

    /// Run one statement. Command-level errors are reported here.
    pub(crate) fn execute_statement<'a>(
        &'a mut self,
        statement: &'a Statement,
        io: &'a IoContext,
    ) -> BoxFuture<'a, Result<ControlFlow>> {
        Box::pin(async move {
            match self.dispatch(statement, io).await {
                Ok(flow) => Ok(flow),
                Err(Error::Exit(code)) => {
                    self.last_status = code;
                    Ok(ControlFlow::Exit(code))
                }
                Err(e) if e.is_fatal() => Err(e),
                Err(e) => {
                    io.diagnostic(&format!("tidesh: {e}"));
                    self.last_status = e.exit_code();
                    Ok(self.errexit_flow())
                }
            }
        })
    }

    async fn dispatch(&mut self, statement: &Statement, io: &IoContext) -> Result<ControlFlow> {
        match statement {
            Statement::Command(cmd) => self.execute_command(cmd, io).await,
            Statement::Pipeline(pipeline) => self.execute_pipeline(pipeline, io).await,
            Statement::AndOr(list) => self.execute_and_or(list, io).await,
            Statement::If(stmt) => self.execute_if(stmt, io).await,
            Statement::For(stmt) => {
                self.loop_depth += 1;
                let flow = self.execute_for(stmt, io).await;
                self.loop_depth -= 1;
                flow
            }
            Statement::ArithFor(stmt) => {
                self.loop_depth += 1;
                let flow = self.execute_arith_for(stmt, io).await;
                self.loop_depth -= 1;
                flow
            }
            Statement::While(stmt) => {
                self.loop_depth += 1;
                let flow = self.execute_while(stmt, io).await;
                self.loop_depth -= 1;
                flow
            }
            Statement::Case(stmt) => self.execute_case(stmt, io).await,
            Statement::Function(func) => {
                self.functions.insert(func.name.clone(), func.body.clone());
                self.last_status = 0;
                Ok(ControlFlow::Normal)
            }
            Statement::Block(block) => self.execute_statements(&block.statements, io).await,
            Statement::Subshell(block) => self.execute_subshell(block, io).await,
            Statement::Arithmetic(arith) => {
                let value = self.expand_arithmetic(&arith.expression, io).await?;
                self.last_status = if value != 0 { 0 } else { 1 };
                Ok(self.errexit_flow())
            }
            Statement::Break(control) => self.loop_control(control, io, true).await,
            Statement::Continue(control) => self.loop_control(control, io, false).await,
            Statement::Return(ret) => self.execute_return(ret, io).await,
            Statement::Background(bg) => self.execute_background(bg, io).await,
            Statement::Redirected(redirected) => {
                let inner_io = self.apply_redirects(&redirected.redirects, io).await?;
                let flow = self.execute_statement(&redirected.body, &inner_io).await;
                self.finish_process_substitutions(io).await?;
                flow
            }
        }
    }

    /// `set -e`: stop if the last status failed outside a condition.
    fn errexit_flow(&self) -> ControlFlow {
        if self.options.is_set(ShellOption::Errexit) && self.condition_depth == 0 && self.last_status != 0 {
            tracing::debug!(status = self.last_status, "errexit");
            ControlFlow::Exit(self.last_status)
        } else {
            ControlFlow::Normal
        }
    }

    /// Run statements where a failure is a test result, not an error.
    async fn run_condition(&mut self, statements: &[Statement], io: &IoContext) -> Result<ControlFlow> {
        self.condition_depth += 1;
        let flow = self.execute_statements(statements, io).await;
        self.condition_depth -= 1;
        flow
    }

    async fn execute_and_or(&mut self, list: &AndOrList, io: &IoContext) -> Result<ControlFlow> {
        let flow = if list.rest.is_empty() {
            self.execute_statement(&list.first, io).await?
        } else {
            self.run_condition(std::slice::from_ref(list.first.as_ref()), io).await?
        };
        if !flow.is_normal() {
            return Ok(flow);
        }

        for (i, (op, statement)) in list.rest.iter().enumerate() {
            let run = match op {
                AndOrOp::And => self.last_status == 0,
                AndOrOp::Or => self.last_status != 0,
            };
            if !run {
                continue;
            }
            let flow = if i + 1 == list.rest.len() {
                self.execute_statement(statement, io).await?
            } else {
                self.run_condition(std::slice::from_ref(statement), io).await?
            };
            if !flow.is_normal() {
                return Ok(flow);
            }
        }
        Ok(ControlFlow::Normal)
    }

    async fn execute_if(&mut self, stmt: &IfStatement, io: &IoContext) -> Result<ControlFlow> {
        let flow = self.run_condition(&stmt.condition, io).await?;
        if !flow.is_normal() {
            return Ok(flow);
        }
        if self.last_status == 0 {
            return self.execute_statements(&stmt.consequence, io).await;
        }

        for elif in &stmt.elifs {
            let flow = self.run_condition(&elif.condition, io).await?;
            if !flow.is_normal() {
                return Ok(flow);
            }
            if self.last_status == 0 {
                return self.execute_statements(&elif.body, io).await;
            }
        }

        match &stmt.alternative {
            Some(body) => self.execute_statements(body, io).await,
            None => {
                self.last_status = 0;
                Ok(ControlFlow::Normal)
            }
        }
    }

    async fn execute_for(&mut self, stmt: &ForStatement, io: &IoContext) -> Result<ControlFlow> {
        let items = match &stmt.items {
            Some(words) => self.expand_words(words, io).await?,
            None => self.env.positional().to_vec(),
        };
        self.last_status = 0;
        for item in items {
            self.env.set(&stmt.variable, item);
            let flow = self.execute_statements(&stmt.body, io).await?;
            if let Some(flow) = after_body(flow) {
                return Ok(flow);
            }
        }
        Ok(ControlFlow::Normal)
    }

    async fn execute_arith_for(&mut self, stmt: &ArithForStatement, io: &IoContext) -> Result<ControlFlow> {
        self.expand_arithmetic(&stmt.init, io).await?;
        let mut body_status = 0;
        loop {
            if !stmt.condition.trim().is_empty() && self.expand_arithmetic(&stmt.condition, io).await? == 0 {
                break;
            }
            let flow = self.execute_statements(&stmt.body, io).await?;
            body_status = self.last_status;
            if let Some(flow) = after_body(flow) {
                return Ok(flow);
            }
            self.expand_arithmetic(&stmt.step, io).await?;
        }
        self.last_status = body_status;
        Ok(ControlFlow::Normal)
    }

    async fn execute_while(&mut self, stmt: &WhileStatement, io: &IoContext) -> Result<ControlFlow> {
        let mut body_status = 0;
        loop {
            let flow = self.run_condition(&stmt.condition, io).await?;
            if let Some(flow) = after_body(flow) {
                return Ok(flow);
            }
            if (self.last_status == 0) == stmt.until {
                break;
            }
            let flow = self.execute_statements(&stmt.body, io).await?;
            body_status = self.last_status;
            if let Some(flow) = after_body(flow) {
                return Ok(flow);
            }
        }
        self.last_status = body_status;
        Ok(ControlFlow::Normal)
    }

    async fn execute_case(&mut self, stmt: &CaseStatement, io: &IoContext) -> Result<ControlFlow> {
        let word = self.expand_word_string(&stmt.word, io).await?;
        self.last_status = 0;
        let mut fall_through = false;
        for clause in &stmt.clauses {
            let mut hit = fall_through;
            if !hit {
                for pattern in &clause.patterns {
                    let pattern = self.expand_word_pattern(pattern, io).await?;
                    if crate::expand::glob::pattern_matches(pattern.trim(), &word) {
                        hit = true;
                        break;
                    }
                }
            }
            if !hit {
                continue;
            }
            self.last_status = 0;
            let flow = self.execute_statements(&clause.body, io).await?;
            if !flow.is_normal() {
                return Ok(flow);
            }
            match clause.terminator {
                CaseTerminator::Break => break,
                CaseTerminator::FallThrough => fall_through = true,
                CaseTerminator::Continue => fall_through = false,
            }
        }
        Ok(ControlFlow::Normal)
    }

    async fn execute_subshell(&mut self, block: &BlockStatement, io: &IoContext) -> Result<ControlFlow> {
        let mut sub = self.subshell();
        let outcome = sub.execute_statements(&block.statements, io).await;
        sub.finish_process_substitutions(io).await?;
        self.last_status = fork_status(&sub, outcome, io)?;
        Ok(self.errexit_flow())
    }

    async fn loop_control(&mut self, control: &LoopControl, io: &IoContext, is_break: bool) -> Result<ControlFlow> {
        let builtin = if is_break { "break" } else { "continue" };
        let levels = match &control.level {
            Some(word) => {
                let text = self.expand_word_string(word, io).await?;
                match text.trim().parse::<u32>() {
                    Ok(n) if n > 0 => n,
                    _ => {
                        io.diagnostic(&format!("tidesh: {builtin}: {text}: loop count out of range"));
                        self.last_status = 1;
                        return Ok(ControlFlow::Normal);
                    }
                }
            }
            None => 1,
        };
        if self.loop_depth == 0 {
            io.diagnostic(&format!(
                "tidesh: {builtin}: only meaningful in a `for', `while', or `until' loop"
            ));
            self.last_status = 0;
            return Ok(ControlFlow::Normal);
        }
        let levels = levels.min(u32::try_from(self.loop_depth).unwrap_or(u32::MAX));
        self.last_status = 0;
        Ok(if is_break {
            ControlFlow::Break(levels)
        } else {
            ControlFlow::Continue(levels)
        })
    }

    async fn execute_return(&mut self, ret: &ReturnStatement, io: &IoContext) -> Result<ControlFlow> {
        if !self.env.in_function() && self.source_depth == 0 {
            io.diagnostic("tidesh: return: can only `return' from a function or sourced script");
            self.last_status = 1;
            return Ok(ControlFlow::Normal);
        }
        let code = match &ret.status {
            Some(word) => {
                let text = self.expand_word_string(word, io).await?;
                match text.trim().parse::<i64>() {
                    Ok(n) => n.rem_euclid(256) as i32,
                    Err(_) => {
                        io.diagnostic(&format!("tidesh: return: {text}: numeric argument required"));
                        2
                    }
                }
            }
            None => self.last_status,
        };
        self.last_status = code;
        Ok(ControlFlow::Return(code))
    }

    async fn execute_background(&mut self, bg: &BackgroundStatement, io: &IoContext) -> Result<ControlFlow> {
        if let Statement::Command(cmd) = bg.statement.as_ref() {
            if self.is_external_stage(&bg.statement) {
                if let Some(running) = self.spawn_stage(cmd, io, true).await? {
                    let (id, pid) = track_background(running, self.jobs.clone(), &bg.command_line);
                    io.diagnostic(&format!("[{id}] {}", pid.unwrap_or_default()));
                }
                self.last_status = 0;
                return Ok(ControlFlow::Normal);
            }
        }

        // anything else runs on a fork inside this process, so it has no pid
        // of its own and the notice shows only the job id
        let id = self.jobs.add_job(None, bg.command_line.clone());
        let mut sub = self.subshell();
        sub.background = true;
        sub.condition_depth = 0;
        let statement = bg.statement.as_ref().clone();
        let job_io = io.with_stdin(Source::Null);
        let jobs = self.jobs.clone();
        tokio::spawn(async move {
            let outcome = sub.execute_statement(&statement, &job_io).await;
            let status = match fork_status(&sub, outcome, &job_io) {
                Ok(status) => status,
                Err(e) => e.exit_code(),
            };
            if let Err(e) = sub.finish_process_substitutions(&job_io).await {
                tracing::warn!(job = id, error = %e, "process substitution cleanup failed");
            }
            jobs.mark_done(id, status);
        });
        io.diagnostic(&format!("[{id}]"));
        self.last_status = 0;
        Ok(ControlFlow::Normal)
    }

    /// Whether a pipeline stage is a simple command naming an external
    /// program. Decided on the literal command name.
    fn is_external_stage(&self, statement: &Statement) -> bool {
        let Statement::Command(cmd) = statement else {
            return false;
        };
        let Some(name) = cmd.name.as_ref().and_then(Word::as_literal) else {
            return false;
        };
        !(self.functions.contains_key(&name)
            || self.builtins.contains_key(&name)
            || matches!(name.as_str(), "eval" | "source" | "."))
    }

    async fn execute_pipeline(&mut self, pipeline: &Pipeline, io: &IoContext) -> Result<ControlFlow> {
        if pipeline.negated {
            self.condition_depth += 1;
        }
        let outcome = self.run_pipeline(&pipeline.commands, io).await;
        if pipeline.negated {
            self.condition_depth -= 1;
        }
        let flow = outcome?;
        if !flow.is_normal() {
            return Ok(flow);
        }
        if pipeline.negated {
            self.last_status = if self.last_status == 0 { 1 } else { 0 };
            return Ok(ControlFlow::Normal);
        }
        Ok(self.errexit_flow())
    }

    /// Run pipeline stages concurrently.
    ///
    /// External stages are spawned right to left so every reader exists
    /// before its writer starts. In-process stages then run left to right
    /// on forks. Two adjacent in-process stages hand data over through a
    /// buffer; every other boundary is an OS pipe.
    async fn run_pipeline(&mut self, commands: &[Statement], io: &IoContext) -> Result<ControlFlow> {
        let n = commands.len();
        if n == 1 {
            let flow = self.execute_statement(&commands[0], io).await?;
            self.env.set_array("PIPESTATUS", vec![self.last_status.to_string()]);
            return Ok(match flow {
                ControlFlow::Exit(_) => flow,
                _ => ControlFlow::Normal,
            });
        }

        let external: Vec<bool> = commands.iter().map(|c| self.is_external_stage(c)).collect();
        let mut stdins: Vec<Source> = vec![io.stdin.clone(); n];
        let mut stdouts: Vec<Sink> = vec![io.stdout.clone(); n];
        let mut handoff: Vec<Option<SharedBuffer>> = vec![None; n];
        for i in 0..n - 1 {
            if !external[i] && !external[i + 1] {
                let (sink, buffer) = Sink::buffer();
                stdouts[i] = sink;
                handoff[i + 1] = Some(buffer);
            } else {
                let (reader, writer) = new_pipe()?;
                stdouts[i] = writer;
                stdins[i + 1] = reader;
            }
        }
        let mut slots: Vec<Option<IoContext>> = stdins
            .into_iter()
            .zip(stdouts)
            .map(|(stdin, stdout)| {
                Some(IoContext {
                    stdin,
                    stdout,
                    stderr: io.stderr.clone(),
                })
            })
            .collect();

        let mut statuses = vec![0; n];
        let mut children: Vec<(usize, Running)> = Vec::new();
        for i in (0..n).rev() {
            if !external[i] {
                continue;
            }
            let Some(stage_io) = slots[i].take() else { continue };
            let Statement::Command(cmd) = &commands[i] else { continue };
            match self.spawn_stage(cmd, &stage_io, false).await {
                Ok(Some(running)) => children.push((i, running)),
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    io.diagnostic(&format!("tidesh: {e}"));
                    statuses[i] = e.exit_code();
                }
            }
        }

        let mut interrupted = None;
        for i in 0..n {
            let Some(mut stage_io) = slots[i].take() else { continue };
            if let Some(buffer) = &handoff[i] {
                stage_io.stdin = Source::bytes(std::mem::take(&mut *lock(buffer)));
            }
            let mut sub = self.subshell();
            let outcome = sub.execute_statement(&commands[i], &stage_io).await;
            match fork_status(&sub, outcome, &stage_io) {
                Ok(status) => statuses[i] = status,
                Err(e) => {
                    statuses[i] = e.exit_code();
                    interrupted = Some(e);
                }
            }
            // dropping the stage's streams closes its pipe ends
            drop(stage_io);
        }
        drop(slots);

        let (indices, running): (Vec<usize>, Vec<Running>) = children.into_iter().unzip();
        let codes = wait_foreground(running, self.limits.kill_grace, !self.background).await?;
        for (i, code) in indices.into_iter().zip(codes) {
            statuses[i] = code;
        }
        if let Some(e) = interrupted {
            return Err(e);
        }

        self.last_status = if self.options.is_set(ShellOption::Pipefail) {
            statuses.iter().rev().copied().find(|s| *s != 0).unwrap_or(0)
        } else {
            statuses[n - 1]
        };
        tracing::debug!(stages = n, status = self.last_status, "pipeline finished");
        self.env
            .set_array("PIPESTATUS", statuses.iter().map(|s| s.to_string()).collect());
        Ok(ControlFlow::Normal)
    }

    /// Expand and spawn an external simple command without waiting.
    /// `None` if the words expanded to nothing.
    async fn spawn_stage(&mut self, cmd: &CommandStatement, io: &IoContext, background: bool) -> Result<Option<Running>> {
        self.last_substitution_status = None;
        let mut words = Vec::new();
        if let Some(name) = &cmd.name {
            words.extend(self.expand_word_fields(name, io).await?);
        }
        words.extend(self.expand_words(&cmd.args, io).await?);
        let stage_io = self.apply_redirects(&cmd.redirects, io).await?;
        let Some((name, args)) = words.split_first() else {
            return Ok(None);
        };

        let mut env = self.env.exported_vars();
        let mut prefix = Vec::new();
        for assignment in &cmd.assignments {
            if let AssignmentValue::Scalar(word) = &assignment.value {
                let value = self.expand_word_string(word, io).await?;
                env.retain(|(k, _)| k != &assignment.name);
                env.push((assignment.name.clone(), value.clone()));
                prefix.push(format!("{}={value}", assignment.name));
            }
        }
        self.trace_command(&prefix, &words, io);

        let path_var = self.env.get("PATH");
        let program = find_executable(name, path_var.as_deref(), &self.cwd)?;
        let running = process::spawn(SpawnRequest {
            name,
            program: &program,
            args,
            env: &env,
            cwd: &self.cwd,
            io: &stage_io,
            background,
        })?;
        Ok(Some(running))
    }

    /// `set -x` output.
    fn trace_command(&self, prefix: &[String], words: &[String], io: &IoContext) {
        if self.options.is_set(ShellOption::Xtrace) {
            let line: Vec<&str> = prefix.iter().chain(words).map(String::as_str).collect();
            let _ = io.stderr.write_str(&format!("+ {}\n", line.join(" ")));
        }
    }

    async fn execute_command(&mut self, cmd: &CommandStatement, io: &IoContext) -> Result<ControlFlow> {
        self.last_substitution_status = None;

        let mut words = Vec::new();
        if let Some(name) = &cmd.name {
            words.extend(self.expand_word_fields(name, io).await?);
        }
        let mut array_declarations = Vec::new();
        for (i, arg) in cmd.args.iter().enumerate() {
            match cmd.declarations.iter().find(|(pos, _)| *pos == i) {
                Some((_, assignment)) => match &assignment.value {
                    AssignmentValue::Scalar(value) if assignment.index.is_none() => {
                        let value = self.expand_word_string(value, io).await?;
                        let op = if assignment.append { "+=" } else { "=" };
                        words.push(format!("{}{op}{value}", assignment.name));
                    }
                    _ => {
                        words.push(assignment.name.clone());
                        array_declarations.push(assignment);
                    }
                },
                None => words.extend(self.expand_word_fields(arg, io).await?),
            }
        }

        if words.is_empty() {
            for assignment in &cmd.assignments {
                self.assign(assignment, io).await?;
            }
            // redirects still open (and create) their files
            self.apply_redirects(&cmd.redirects, io).await?;
            self.last_status = self.last_substitution_status.unwrap_or(0);
            self.finish_process_substitutions(io).await?;
            return Ok(self.errexit_flow());
        }

        let cmd_io = self.apply_redirects(&cmd.redirects, io).await?;

        let mut saved = Vec::new();
        let mut prefix = Vec::new();
        for assignment in &cmd.assignments {
            saved.push((
                assignment.name.clone(),
                self.env.get(&assignment.name),
                self.env.is_exported(&assignment.name),
            ));
            self.assign(assignment, io).await?;
            self.env.export(&assignment.name);
            prefix.push(format!(
                "{}={}",
                assignment.name,
                self.env.get(&assignment.name).unwrap_or_default()
            ));
        }
        self.trace_command(&prefix, &words, io);

        let name = words[0].clone();
        let args = &words[1..];
        tracing::debug!(command = %name, args = args.len(), "dispatch");
        let outcome = match name.as_str() {
            "eval" => self.eval(args, &cmd_io).await,
            "source" | "." => self.source(args, &cmd_io).await,
            _ => {
                if let Some(body) = self.functions.get(&name).cloned() {
                    self.call_function(&name, body, args.to_vec(), &cmd_io).await
                } else if let Some(builtin) = self.builtins.get(&name).cloned() {
                    self.run_builtin(builtin, args, &cmd_io).await.map(|_| ControlFlow::Normal)
                } else {
                    self.run_external(&name, args, &cmd_io).await.map(|_| ControlFlow::Normal)
                }
            }
        };

        for (name, value, exported) in saved.into_iter().rev() {
            self.env.unset(&name);
            if let Some(value) = value {
                self.env.set(&name, value);
                if exported {
                    self.env.export(&name);
                }
            }
        }
        if outcome.is_ok() {
            let status = self.last_status;
            for assignment in array_declarations {
                self.assign(assignment, io).await?;
            }
            self.last_status = status;
        }
        self.finish_process_substitutions(io).await?;

        match outcome? {
            ControlFlow::Normal => Ok(self.errexit_flow()),
            flow => Ok(flow),
        }
    }

    async fn run_builtin(&mut self, builtin: Arc<dyn Builtin>, args: &[String], io: &IoContext) -> Result<()> {
        let ctx = Context {
            args,
            env: &mut self.env,
            options: &mut self.options,
            cwd: &mut self.cwd,
            jobs: &self.jobs,
            last_status: self.last_status,
        };
        let result = builtin.execute(ctx).await?;
        io.stdout.write_str(&result.stdout)?;
        io.stderr.write_str(&result.stderr)?;
        self.last_status = result.exit_code;
        Ok(())
    }

    async fn run_external(&mut self, name: &str, args: &[String], io: &IoContext) -> Result<()> {
        let path_var = self.env.get("PATH");
        let program = find_executable(name, path_var.as_deref(), &self.cwd)?;
        let env = self.env.exported_vars();
        let running = process::spawn(SpawnRequest {
            name,
            program: &program,
            args,
            env: &env,
            cwd: &self.cwd,
            io,
            background: false,
        })?;
        let codes = wait_foreground(vec![running], self.limits.kill_grace, !self.background).await?;
        self.last_status = codes.first().copied().unwrap_or(0);
        tracing::debug!(command = %name, status = self.last_status, "external finished");
        Ok(())
    }

    /// Call a shell function with `args` as `$1..$N`.
    async fn call_function(
        &mut self,
        name: &str,
        body: Arc<Statement>,
        args: Vec<String>,
        io: &IoContext,
    ) -> Result<ControlFlow> {
        self.counters.push_function(&self.limits)?;
        let scope = self.env.enter_function(name, args);
        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        let outcome = self.execute_statement(&body, io).await;
        self.loop_depth = saved_loops;
        self.env.leave_function(scope);
        self.counters.pop_function();

        match outcome? {
            ControlFlow::Return(code) => {
                self.last_status = code;
                Ok(ControlFlow::Normal)
            }
            ControlFlow::Exit(code) => Ok(ControlFlow::Exit(code)),
            _ => Ok(ControlFlow::Normal),
        }
    }

    async fn eval(&mut self, args: &[String], io: &IoContext) -> Result<ControlFlow> {
        let script = args.join(" ");
        let program = Parser::new(&script).parse()?;
        self.last_status = 0;
        self.execute_statements(&program.statements, io).await
    }

    /// `source FILE [ARGS]` / `. FILE [ARGS]`
    async fn source(&mut self, args: &[String], io: &IoContext) -> Result<ControlFlow> {
        let Some((file, rest)) = args.split_first() else {
            io.diagnostic("tidesh: source: filename argument required");
            self.last_status = 2;
            return Ok(ControlFlow::Normal);
        };
        let path = if file.contains('/') {
            self.cwd.join(file)
        } else {
            let path_var = self.env.get("PATH").unwrap_or_default();
            path_var
                .split(':')
                .filter(|dir| !dir.is_empty())
                .map(|dir| self.cwd.join(dir).join(file))
                .find(|p| p.is_file())
                .unwrap_or_else(|| self.cwd.join(file))
        };
        let script = std::fs::read_to_string(&path).map_err(|e| Error::CommandFailed {
            name: file.clone(),
            message: match e.kind() {
                std::io::ErrorKind::NotFound => "No such file or directory".to_string(),
                _ => e.to_string(),
            },
            code: 1,
        })?;
        let program = Parser::new(&script).parse()?;

        let saved_args = (!rest.is_empty()).then(|| {
            let previous = self.env.positional().to_vec();
            self.env.set_positional(rest.to_vec());
            previous
        });
        self.source_depth += 1;
        self.last_status = 0;
        let outcome = self.execute_statements(&program.statements, io).await;
        self.source_depth -= 1;
        if let Some(previous) = saved_args {
            self.env.set_positional(previous);
        }

        match outcome? {
            ControlFlow::Return(code) => {
                self.last_status = code;
                Ok(ControlFlow::Normal)
            }
            flow => Ok(flow),
        }
    }

    /// Perform a variable assignment.
    pub(crate) async fn assign(&mut self, assignment: &Assignment, io: &IoContext) -> Result<()> {
        let name = assignment.name.as_str();
        match (&assignment.value, &assignment.index) {
            (AssignmentValue::Scalar(word), None) => {
                let value = self.expand_word_string(word, io).await?;
                tracing::debug!(name, value = %self.log_config.loggable_value(name, &value), "assign");
                if name == "RANDOM" {
                    if let Ok(seed) = value.trim().parse::<u64>() {
                        self.env.seed(seed);
                    }
                } else if assignment.append {
                    self.env.append(name, &value);
                } else {
                    self.env.set(name, value);
                }
            }
            (AssignmentValue::Scalar(word), Some(index)) => {
                let value = self.expand_word_string(word, io).await?;
                if self.env.kind(name) == Some(VarKind::Associative) {
                    let key = self.expand_text(index, io).await?;
                    let value = match (assignment.append, self.env.get_assoc_element(name, &key)) {
                        (true, Some(current)) => current + &value,
                        _ => value,
                    };
                    self.env.set_assoc_element(name, &key, value);
                } else {
                    let position = self.array_index(name, index, io).await?;
                    let value = match (assignment.append, self.env.get_element(name, position)) {
                        (true, Some(current)) => current + &value,
                        _ => value,
                    };
                    self.env.set_element(name, position, value);
                }
            }
            (AssignmentValue::Array(elements), _) => {
                if self.env.kind(name) == Some(VarKind::Associative) {
                    let mut map: BTreeMap<String, String> = if assignment.append {
                        self.env.keys(name).into_iter().zip(self.env.values(name)).collect()
                    } else {
                        BTreeMap::new()
                    };
                    for element in elements {
                        let Some(key) = &element.key else {
                            return Err(Error::InvalidExpression(format!(
                                "{name}: must use subscript when assigning associative array"
                            )));
                        };
                        let key = self.expand_text(key, io).await?;
                        let value = self.expand_word_string(&element.value, io).await?;
                        map.insert(key, value);
                    }
                    self.env.set_assoc(name, map);
                } else {
                    let (mut values, mut next) = if assignment.append {
                        (self.env.indexed(name), self.env.array_end(name))
                    } else {
                        (BTreeMap::new(), 0)
                    };
                    for element in elements {
                        match &element.key {
                            Some(key) => {
                                let position = self.expand_arithmetic(key, io).await?;
                                let position = usize::try_from(position).map_err(|_| {
                                    Error::InvalidExpression(format!("{name}[{key}]: bad array subscript"))
                                })?;
                                values.insert(position, self.expand_word_string(&element.value, io).await?);
                                next = position.saturating_add(1);
                            }
                            None => {
                                for field in self.expand_word_fields(&element.value, io).await? {
                                    values.insert(next, field);
                                    next = next.saturating_add(1);
                                }
                            }
                        }
                    }
                    tracing::debug!(name, elements = values.len(), "assign array");
                    self.env.set_indexed(name, values);
                }
            }
        }
        Ok(())
    }

    /// Resolve an indexed-array subscript; negative values count from the end.
    async fn array_index(&mut self, name: &str, index: &str, io: &IoContext) -> Result<usize> {
        let value = self.expand_arithmetic(index, io).await?;
        self.env
            .resolve_index(name, value)
            .ok_or_else(|| Error::InvalidExpression(format!("{name}[{index}]: bad array subscript")))
    }

    /// Run the readers of `>(...)` substitutions and drop the backing files.
    pub(crate) async fn finish_process_substitutions(&mut self, io: &IoContext) -> Result<()> {
        let pending = std::mem::take(&mut self.pending_substitutions);
        for substitution in pending {
            let Some(program) = &substitution.program else { continue };
            let data = std::fs::read(&substitution.path)?;
            let reader_io = io.with_stdin(Source::bytes(data));
            let mut sub = self.subshell();
            let outcome = sub.execute_statements(&program.statements, &reader_io).await;
            fork_status(&sub, outcome, io)?;
        }
        Ok(())
    }
}

#[cfg(test)]
impl Interpreter {
    /// Interpreter with default builtins and an empty environment.
    pub(crate) fn for_tests(cwd: &std::path::Path) -> Self {
        let mut env = Environment::new();
        if let Ok(path) = std::env::var("PATH") {
            env.set("PATH", path);
            env.export("PATH");
        }
        Interpreter::new(
            env,
            cwd.to_path_buf(),
            ShellOptions::new(),
            ExecutionLimits::new(),
            LogConfig::new(),
            crate::builtins::default_builtins(),
        )
    }
}
