//! Process runner: external command lookup, spawning and waiting
//!
//! Foreground waits race the children against SIGINT/SIGTERM. A signal
//! received by the shell is forwarded to the children, which get a grace
//! period to exit before they are killed.

use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::signal::unix::{SignalKind, signal as listen};
use tokio::task::JoinHandle;

use super::io::{ChildInput, ChildOutput, IoContext, SharedBuffer, lock};
use super::jobs::JobManager;
use crate::error::{Error, Result};

/// Find an executable for `name`.
///
/// Names containing `/` are taken as paths relative to `cwd`. Otherwise each
/// `PATH` entry is searched in order; an empty entry means `cwd`.
pub fn find_executable(name: &str, path_var: Option<&str>, cwd: &Path) -> Result<PathBuf> {
    if name.contains('/') {
        let path = cwd.join(name);
        return match executable_state(&path) {
            Some(true) => Ok(path),
            Some(false) => Err(not_executable(name)),
            None => Err(Error::CommandFailed {
                name: name.to_string(),
                message: "No such file or directory".to_string(),
                code: 127,
            }),
        };
    }

    let mut denied = false;
    for dir in path_var.unwrap_or("").split(':') {
        let dir = if dir.is_empty() { cwd.to_path_buf() } else { cwd.join(dir) };
        let candidate = dir.join(name);
        match executable_state(&candidate) {
            Some(true) => return Ok(candidate),
            Some(false) => denied = true,
            None => {}
        }
    }
    if denied {
        Err(not_executable(name))
    } else {
        Err(Error::CommandNotFound(name.to_string()))
    }
}

fn not_executable(name: &str) -> Error {
    Error::CommandFailed {
        name: name.to_string(),
        message: "Permission denied".to_string(),
        code: 126,
    }
}

/// `None` if missing, `Some(false)` if present but not a runnable file.
fn executable_state(path: &Path) -> Option<bool> {
    let meta = std::fs::metadata(path).ok()?;
    Some(meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

/// Shell exit status for a finished process: its code, or 128 + signal.
pub fn status_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(1)
}

/// What to run and where.
pub(crate) struct SpawnRequest<'a> {
    pub name: &'a str,
    pub program: &'a Path,
    pub args: &'a [String],
    pub env: &'a [(String, String)],
    pub cwd: &'a Path,
    pub io: &'a IoContext,
    /// Start in a new process group with stdin closed
    pub background: bool,
}

/// A spawned child plus the tasks moving its captured I/O.
#[derive(Debug)]
pub(crate) struct Running {
    pub name: String,
    child: Child,
    io_tasks: Vec<JoinHandle<()>>,
}

impl Running {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait without signal handling, for background jobs.
    pub async fn wait_plain(mut self) -> i32 {
        let code = match self.child.wait().await {
            Ok(status) => status_code(status),
            Err(e) => {
                tracing::warn!(command = %self.name, error = %e, "wait failed");
                1
            }
        };
        self.finish_io().await;
        code
    }

    async fn finish_io(&mut self) {
        for task in self.io_tasks.drain(..) {
            let _ = task.await;
        }
    }
}

/// Start an external process.
pub(crate) fn spawn(req: SpawnRequest<'_>) -> Result<Running> {
    let mut cmd = Command::new(req.program);
    cmd.args(req.args)
        .env_clear()
        .envs(req.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .current_dir(req.cwd);

    let failed = |e: std::io::Error| Error::CommandFailed {
        name: req.name.to_string(),
        message: e.to_string(),
        code: 126,
    };

    let mut feed = None;
    if req.background {
        cmd.process_group(0);
        cmd.stdin(Stdio::null());
    } else {
        match req.io.stdin.child_input().map_err(failed)? {
            ChildInput::Stdio(stdio) => {
                cmd.stdin(stdio);
            }
            ChildInput::Feed(data) => {
                cmd.stdin(Stdio::piped());
                feed = Some(data);
            }
        }
    }

    let mut capture_out = None;
    match req.io.stdout.child_output().map_err(failed)? {
        ChildOutput::Stdio(stdio) => {
            cmd.stdout(stdio);
        }
        ChildOutput::Capture(buf) => {
            cmd.stdout(Stdio::piped());
            capture_out = Some(buf);
        }
    }
    let mut capture_err = None;
    match req.io.stderr.child_output().map_err(failed)? {
        ChildOutput::Stdio(stdio) => {
            cmd.stderr(stdio);
        }
        ChildOutput::Capture(buf) => {
            cmd.stderr(Stdio::piped());
            capture_err = Some(buf);
        }
    }

    let mut child = cmd.spawn().map_err(failed)?;
    tracing::debug!(command = %req.name, pid = ?child.id(), background = req.background, "spawned");

    let mut io_tasks = Vec::new();
    if let (Some(data), Some(mut stdin)) = (feed, child.stdin.take()) {
        io_tasks.push(tokio::spawn(async move {
            // the child may exit without reading everything
            let _ = stdin.write_all(&data).await;
        }));
    }
    if let (Some(buf), Some(out)) = (capture_out, child.stdout.take()) {
        io_tasks.push(tokio::spawn(drain_into(out, buf)));
    }
    if let (Some(buf), Some(err)) = (capture_err, child.stderr.take()) {
        io_tasks.push(tokio::spawn(drain_into(err, buf)));
    }

    Ok(Running {
        name: req.name.to_string(),
        child,
        io_tasks,
    })
}

async fn drain_into<R: tokio::io::AsyncRead + Unpin>(mut reader: R, buf: SharedBuffer) {
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => lock(&buf).extend_from_slice(&chunk[..n]),
        }
    }
}

/// SIGINT/SIGTERM listeners for one foreground wait.
struct Interrupts {
    int: Option<tokio::signal::unix::Signal>,
    term: Option<tokio::signal::unix::Signal>,
}

impl Interrupts {
    fn install() -> Self {
        Self {
            int: listen(SignalKind::interrupt()).ok(),
            term: listen(SignalKind::terminate()).ok(),
        }
    }

    async fn recv(&mut self) -> Signal {
        async fn next(listener: &mut Option<tokio::signal::unix::Signal>) {
            match listener {
                Some(l) => {
                    if l.recv().await.is_none() {
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        }
        tokio::select! {
            _ = next(&mut self.int) => Signal::SIGINT,
            _ = next(&mut self.term) => Signal::SIGTERM,
        }
    }
}

/// Wait for foreground children, forwarding SIGINT/SIGTERM to them.
///
/// Returns each child's exit status in order. If the shell is signalled the
/// same signal goes to every child; children still running after `grace`
/// are killed and the wait fails with [`Error::Interrupted`]. Statements
/// running as background jobs pass `forward_signals = false` and simply wait.
pub(crate) async fn wait_foreground(
    mut children: Vec<Running>,
    grace: Duration,
    forward_signals: bool,
) -> Result<Vec<i32>> {
    if children.is_empty() {
        return Ok(Vec::new());
    }
    let outcome = {
        let waits = join_all(children.iter_mut().map(|r| r.child.wait()));
        if forward_signals {
            let mut interrupts = Interrupts::install();
            tokio::select! {
                statuses = waits => Ok(statuses),
                sig = interrupts.recv() => Err(sig),
            }
        } else {
            Ok(waits.await)
        }
    };

    match outcome {
        Ok(statuses) => {
            let mut codes = Vec::with_capacity(statuses.len());
            for (running, status) in children.iter_mut().zip(statuses) {
                running.finish_io().await;
                codes.push(match status {
                    Ok(status) => status_code(status),
                    Err(e) => {
                        return Err(Error::CommandFailed {
                            name: running.name.clone(),
                            message: e.to_string(),
                            code: 1,
                        });
                    }
                });
            }
            Ok(codes)
        }
        Err(sig) => {
            tracing::debug!(signal = ?sig, children = children.len(), "forwarding signal");
            for running in &children {
                if let Some(pid) = running.pid() {
                    if let Err(e) = signal::kill(Pid::from_raw(pid as i32), sig) {
                        tracing::warn!(command = %running.name, error = %e, "could not forward signal");
                    }
                }
            }
            for running in &mut children {
                if tokio::time::timeout(grace, running.child.wait()).await.is_err() {
                    tracing::warn!(command = %running.name, "child ignored signal, killing");
                    let _ = running.child.kill().await;
                }
                running.finish_io().await;
            }
            Err(Error::Interrupted { signal: sig as i32 })
        }
    }
}

/// Track a background child: register it as a job and mark the job done
/// when the process exits. Returns the job id.
pub(crate) fn track_background(running: Running, jobs: Arc<JobManager>, command_line: &str) -> (usize, Option<u32>) {
    let pid = running.pid();
    let id = jobs.add_job(pid, command_line);
    tokio::spawn(async move {
        let code = running.wait_plain().await;
        jobs.mark_done(id, code);
    });
    (id, pid)
}

/// Send SIGCONT to a background job's process group.
pub fn continue_group(pid: u32) -> Result<()> {
    signal::killpg(Pid::from_raw(pid as i32), Signal::SIGCONT)
        .map_err(|e| Error::Io(std::io::Error::from(e)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::interpreter::io::{Sink, Source, take_string};

    fn path_var() -> Option<String> {
        std::env::var("PATH").ok()
    }

    #[test]
    fn test_find_executable_on_path() {
        let found = find_executable("sh", path_var().as_deref(), Path::new("/")).unwrap();
        assert!(found.ends_with("sh"));
    }

    #[test]
    fn test_missing_command_is_127() {
        let err = find_executable("definitely-not-a-command-xyz", path_var().as_deref(), Path::new("/"))
            .unwrap_err();
        assert!(matches!(err, Error::CommandNotFound(_)));
        assert_eq!(err.exit_code(), 127);
    }

    #[test]
    fn test_non_executable_file_is_126() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("script"), "echo hi").unwrap();
        let err = find_executable("./script", None, dir.path()).unwrap_err();
        assert_eq!(err.exit_code(), 126);
        let err = find_executable("script", Some(dir.path().to_str().unwrap()), dir.path()).unwrap_err();
        assert_eq!(err.exit_code(), 126);
    }

    #[tokio::test]
    async fn test_spawn_captures_output_and_feeds_input() {
        let (stdout, out) = Sink::buffer();
        let io = IoContext {
            stdin: Source::bytes("fed\n"),
            stdout,
            stderr: Sink::Null,
        };
        let program = find_executable("cat", path_var().as_deref(), Path::new("/")).unwrap();
        let running = spawn(SpawnRequest {
            name: "cat",
            program: &program,
            args: &[],
            env: &[],
            cwd: Path::new("/"),
            io: &io,
            background: false,
        })
        .unwrap();
        let codes = wait_foreground(vec![running], Duration::from_secs(1), false).await.unwrap();
        assert_eq!(codes, vec![0]);
        assert_eq!(take_string(&out), "fed\n");
    }

    #[tokio::test]
    async fn test_exit_status_is_reported() {
        let (io, _, _) = IoContext::captured();
        let program = find_executable("sh", path_var().as_deref(), Path::new("/")).unwrap();
        let args = vec!["-c".to_string(), "exit 3".to_string()];
        let running = spawn(SpawnRequest {
            name: "sh",
            program: &program,
            args: &args,
            env: &[],
            cwd: Path::new("/"),
            io: &io,
            background: false,
        })
        .unwrap();
        assert_eq!(running.wait_plain().await, 3);
    }

    #[tokio::test]
    async fn test_background_job_completes() {
        let (io, _, _) = IoContext::captured();
        let jobs = Arc::new(JobManager::new());
        let program = find_executable("true", path_var().as_deref(), Path::new("/")).unwrap();
        let running = spawn(SpawnRequest {
            name: "true",
            program: &program,
            args: &[],
            env: &[],
            cwd: Path::new("/"),
            io: &io,
            background: true,
        })
        .unwrap();
        let (id, pid) = track_background(running, jobs.clone(), "true");
        assert_eq!(id, 1);
        assert!(pid.is_some());
        assert_eq!(jobs.wait(id).await, Some(0));
    }
}
