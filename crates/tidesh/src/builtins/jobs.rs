//! Job control builtins (jobs, wait, fg, bg)

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::Result;
use crate::interpreter::{ExecResult, JobInfo, JobManager, JobStatus, continue_group};

fn format_job(job: &JobInfo, current: Option<usize>, with_pid: bool) -> String {
    let marker = if Some(job.id) == current { '+' } else { ' ' };
    let status = match (job.status, job.exit_code) {
        (JobStatus::Done, Some(code)) if code != 0 => format!("Exit {code}"),
        (status, _) => status.to_string(),
    };
    let pid = match (with_pid, job.pid) {
        (true, Some(pid)) => format!("{pid} "),
        _ => String::new(),
    };
    format!("[{}]{marker}  {pid}{status:<22}{}\n", job.id, job.command_line)
}

/// Resolve a `%N`/pid argument, or the current job with no argument.
fn target_job(jobs: &JobManager, arg: Option<&String>, builtin: &str) -> std::result::Result<usize, ExecResult> {
    match arg {
        Some(spec) => jobs
            .resolve(spec)
            .ok_or_else(|| ExecResult::err(format!("{builtin}: {spec}: no such job\n"), 1)),
        None => jobs
            .current_job()
            .ok_or_else(|| ExecResult::err(format!("{builtin}: current: no such job\n"), 1)),
    }
}

/// The jobs builtin - list background jobs.
///
/// `-l` adds process ids, `-p` prints only process ids. Finished jobs are
/// reported once and then forgotten.
pub struct Jobs;

#[async_trait]
impl Builtin for Jobs {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let long = ctx.args.iter().any(|a| a == "-l");
        let pids_only = ctx.args.iter().any(|a| a == "-p");
        let current = ctx.jobs.current_job();

        let mut output = String::new();
        for job in ctx.jobs.get_all_jobs() {
            if pids_only {
                if let Some(pid) = job.pid {
                    output.push_str(&format!("{pid}\n"));
                }
            } else {
                output.push_str(&format_job(&job, current, long));
            }
        }
        ctx.jobs.cleanup_done();
        Ok(ExecResult::ok(output))
    }
}

/// The wait builtin - wait for background jobs.
///
/// Without arguments waits for every job and returns 0. With job specs or
/// process ids, returns the status of the last one; unknown ones give 127.
pub struct Wait;

#[async_trait]
impl Builtin for Wait {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        if ctx.args.is_empty() {
            ctx.jobs.wait_all().await;
            return Ok(ExecResult::status(0));
        }

        let mut result = ExecResult::status(0);
        for spec in ctx.args {
            match ctx.jobs.resolve(spec) {
                Some(id) => {
                    let code = ctx.jobs.wait(id).await.unwrap_or(127);
                    result.exit_code = code;
                }
                None => {
                    result.stderr.push_str(&format!("wait: {spec}: no such job\n"));
                    result.exit_code = 127;
                }
            }
        }
        Ok(result)
    }
}

/// The fg builtin - wait for a job in the foreground.
///
/// Stopped jobs are sent SIGCONT first. The job is forgotten once it
/// finishes and its status becomes the builtin's status.
pub struct Fg;

#[async_trait]
impl Builtin for Fg {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let id = match target_job(ctx.jobs, ctx.args.first(), "fg") {
            Ok(id) => id,
            Err(result) => return Ok(result),
        };
        let Some(job) = ctx.jobs.get_job(id) else {
            return Ok(ExecResult::err(format!("fg: %{id}: no such job\n"), 1));
        };
        if job.status == JobStatus::Stopped {
            if let Some(pid) = job.pid {
                continue_group(pid)?;
            }
            ctx.jobs.mark_running(id);
        }
        ctx.jobs.set_current_job(id);
        let code = ctx.jobs.wait(id).await.unwrap_or(1);
        ctx.jobs.remove_job(id);
        Ok(ExecResult {
            stdout: format!("{}\n", job.command_line),
            stderr: String::new(),
            exit_code: code,
        })
    }
}

/// The bg builtin - resume a stopped job in the background.
pub struct Bg;

#[async_trait]
impl Builtin for Bg {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let id = match target_job(ctx.jobs, ctx.args.first(), "bg") {
            Ok(id) => id,
            Err(result) => return Ok(result),
        };
        let Some(job) = ctx.jobs.get_job(id) else {
            return Ok(ExecResult::err(format!("bg: %{id}: no such job\n"), 1));
        };
        match job.status {
            JobStatus::Done => Ok(ExecResult::err(format!("bg: job {id} has terminated\n"), 1)),
            JobStatus::Running => Ok(ExecResult::err(
                format!("bg: job {id} already in background\n"),
                0,
            )),
            JobStatus::Stopped => {
                if let Some(pid) = job.pid {
                    continue_group(pid)?;
                }
                ctx.jobs.mark_running(id);
                ctx.jobs.set_current_job(id);
                Ok(ExecResult::ok(format!("[{id}]+ {} &\n", job.command_line)))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::builtins::TestShell;

    #[tokio::test]
    async fn test_jobs_listing_and_cleanup() {
        let mut sh = TestShell::new();
        let a = sh.jobs.add_job(Some(4242), "sleep 10");
        let b = sh.jobs.add_job(Some(4343), "false");
        sh.jobs.mark_done(b, 1);

        let listing = sh.run(&Jobs, &["-l"]).await.unwrap().stdout;
        assert!(listing.contains("[1]   4242 Running"));
        assert!(listing.contains("[2]+  4343 Exit 1"));

        // the finished job was reported and dropped
        assert!(sh.jobs.get_job(b).is_none());
        assert!(sh.jobs.get_job(a).is_some());
        assert_eq!(sh.run(&Jobs, &["-p"]).await.unwrap().stdout, "4242\n");
    }

    #[tokio::test]
    async fn test_wait_specific_and_unknown() {
        let mut sh = TestShell::new();
        let id = sh.jobs.add_job(None, "x");
        sh.jobs.mark_done(id, 5);
        assert_eq!(sh.run(&Wait, &["%1"]).await.unwrap().exit_code, 5);
        let unknown = sh.run(&Wait, &["%7"]).await.unwrap();
        assert_eq!(unknown.exit_code, 127);
        assert_eq!(sh.run(&Wait, &[]).await.unwrap().exit_code, 0);
    }

    #[tokio::test]
    async fn test_fg_waits_and_forgets() {
        let mut sh = TestShell::new();
        let id = sh.jobs.add_job(None, "work");
        let jobs = sh.jobs.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            jobs.mark_done(id, 3);
        });
        let result = sh.run(&Fg, &[]).await.unwrap();
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout, "work\n");
        assert!(sh.jobs.get_job(id).is_none());
        assert_eq!(sh.run(&Fg, &[]).await.unwrap().exit_code, 1);
    }

    #[tokio::test]
    async fn test_bg_on_finished_job() {
        let mut sh = TestShell::new();
        let id = sh.jobs.add_job(None, "done already");
        sh.jobs.mark_done(id, 0);
        let result = sh.run(&Bg, &["%1"]).await.unwrap();
        assert_eq!(result.exit_code, 1);
        assert!(result.stderr.contains("terminated"));
    }
}
