//! Job manager for background execution
//!
//! Jobs are created when a statement is backgrounded with `&` and move to
//! `Done` exactly once, from the task that waits on them. Finished jobs stay
//! queryable until [`JobManager::remove_job`] or
//! [`JobManager::cleanup_done`] drops them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::watch;

/// Lifecycle of a background job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Running,
    Stopped,
    Done,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            JobStatus::Running => "Running",
            JobStatus::Stopped => "Stopped",
            JobStatus::Done => "Done",
        };
        f.write_str(text)
    }
}

/// A background job as seen from outside the manager
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    /// Job number, starting at 1
    pub id: usize,
    /// Process id; `None` for jobs running inside the shell
    pub pid: Option<u32>,
    /// Source text of the backgrounded statement
    pub command_line: String,
    pub status: JobStatus,
    pub started_at: DateTime<Local>,
    /// Set once the job is done
    pub exit_code: Option<i32>,
}

struct JobEntry {
    info: JobInfo,
    done: watch::Sender<Option<i32>>,
}

#[derive(Default)]
struct JobTable {
    jobs: BTreeMap<usize, JobEntry>,
    next_id: usize,
    current: Option<usize>,
    last_pid: Option<u32>,
}

/// Registry of background jobs, shared between the executor and the tasks
/// that wait on each job.
#[derive(Default)]
pub struct JobManager {
    table: Mutex<JobTable>,
}

impl fmt::Debug for JobManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobManager")
            .field("jobs", &self.get_all_jobs())
            .finish()
    }
}

impl JobManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, JobTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a running job and make it the current one. Returns its id.
    pub fn add_job(&self, pid: Option<u32>, command_line: impl Into<String>) -> usize {
        let mut table = self.table();
        table.next_id = table.next_id.max(1);
        let id = table.next_id;
        table.next_id += 1;
        let (done, _) = watch::channel(None);
        let info = JobInfo {
            id,
            pid,
            command_line: command_line.into(),
            status: JobStatus::Running,
            started_at: Local::now(),
            exit_code: None,
        };
        tracing::debug!(job = id, pid = ?pid, "job started");
        table.jobs.insert(id, JobEntry { info, done });
        table.current = Some(id);
        if pid.is_some() {
            table.last_pid = pid;
        }
        id
    }

    /// Look up one job
    pub fn get_job(&self, id: usize) -> Option<JobInfo> {
        self.table().jobs.get(&id).map(|e| e.info.clone())
    }

    /// All known jobs ordered by id
    pub fn get_all_jobs(&self) -> Vec<JobInfo> {
        self.table().jobs.values().map(|e| e.info.clone()).collect()
    }

    /// Make `id` the current job (`%+`). False if it does not exist.
    pub fn set_current_job(&self, id: usize) -> bool {
        let mut table = self.table();
        if table.jobs.contains_key(&id) {
            table.current = Some(id);
            true
        } else {
            false
        }
    }

    /// The current job, if it still exists
    pub fn current_job(&self) -> Option<usize> {
        let table = self.table();
        table.current.filter(|id| table.jobs.contains_key(id))
    }

    /// Record completion. Only the first call for a job has any effect;
    /// returns whether this call did the transition.
    pub fn mark_done(&self, id: usize, exit_code: i32) -> bool {
        let mut table = self.table();
        let Some(entry) = table.jobs.get_mut(&id) else {
            return false;
        };
        if entry.info.status == JobStatus::Done {
            return false;
        }
        entry.info.status = JobStatus::Done;
        entry.info.exit_code = Some(exit_code);
        entry.done.send_replace(Some(exit_code));
        tracing::debug!(job = id, exit_code, "job done");
        true
    }

    /// Record that a job was stopped
    pub fn mark_stopped(&self, id: usize) -> bool {
        self.transition(id, JobStatus::Stopped)
    }

    /// Record that a stopped job was continued
    pub fn mark_running(&self, id: usize) -> bool {
        self.transition(id, JobStatus::Running)
    }

    fn transition(&self, id: usize, status: JobStatus) -> bool {
        let mut table = self.table();
        match table.jobs.get_mut(&id) {
            Some(entry) if entry.info.status != JobStatus::Done => {
                entry.info.status = status;
                true
            }
            _ => false,
        }
    }

    /// Forget a job
    pub fn remove_job(&self, id: usize) -> Option<JobInfo> {
        let mut table = self.table();
        let entry = table.jobs.remove(&id)?;
        if table.current == Some(id) {
            table.current = table.jobs.keys().next_back().copied();
        }
        Some(entry.info)
    }

    /// Forget every finished job and return them
    pub fn cleanup_done(&self) -> Vec<JobInfo> {
        let done: Vec<usize> = self
            .table()
            .jobs
            .values()
            .filter(|e| e.info.status == JobStatus::Done)
            .map(|e| e.info.id)
            .collect();
        done.into_iter().filter_map(|id| self.remove_job(id)).collect()
    }

    /// Process id of the most recent external background job (`$!`)
    pub fn last_pid(&self) -> Option<u32> {
        self.table().last_pid
    }

    /// Resolve a job spec: `%N`, `%%`, `%+`, `%-` or a process id.
    pub fn resolve(&self, spec: &str) -> Option<usize> {
        let table = self.table();
        let id = match spec {
            "%%" | "%+" | "%" => table.current?,
            "%-" => {
                let current = table.current?;
                *table.jobs.keys().rev().find(|id| **id != current)?
            }
            _ => match spec.strip_prefix('%') {
                Some(n) => n.parse().ok()?,
                None => {
                    let pid: u32 = spec.parse().ok()?;
                    table.jobs.values().find(|e| e.info.pid == Some(pid))?.info.id
                }
            },
        };
        table.jobs.contains_key(&id).then_some(id)
    }

    /// Wait for a job to finish and return its exit code.
    /// `None` if the job does not exist or was removed while waiting.
    pub async fn wait(&self, id: usize) -> Option<i32> {
        let mut rx = {
            let table = self.table();
            let entry = table.jobs.get(&id)?;
            entry.done.subscribe()
        };
        let code = *rx.wait_for(|code| code.is_some()).await.ok()?;
        code
    }

    /// Wait for every job that exists now. Returns the last exit code seen,
    /// or 0 with no jobs.
    pub async fn wait_all(&self) -> i32 {
        let ids: Vec<usize> = self.table().jobs.keys().copied().collect();
        let mut last = 0;
        for id in ids {
            if let Some(code) = self.wait(id).await {
                last = code;
            }
        }
        last
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_ids_start_at_one() {
        let jobs = JobManager::new();
        assert_eq!(jobs.add_job(Some(10), "sleep 1"), 1);
        assert_eq!(jobs.add_job(None, "{ a; }"), 2);
        assert_eq!(jobs.current_job(), Some(2));
        assert_eq!(jobs.last_pid(), Some(10));
    }

    #[test]
    fn test_done_transition_happens_once() {
        let jobs = JobManager::new();
        let id = jobs.add_job(Some(1), "true");
        assert!(jobs.mark_done(id, 3));
        assert!(!jobs.mark_done(id, 4));
        let info = jobs.get_job(id).unwrap();
        assert_eq!(info.status, JobStatus::Done);
        assert_eq!(info.exit_code, Some(3));
        assert!(!jobs.mark_stopped(id));
    }

    #[test]
    fn test_done_jobs_remain_until_cleanup() {
        let jobs = JobManager::new();
        let a = jobs.add_job(Some(1), "a");
        let b = jobs.add_job(Some(2), "b");
        jobs.mark_done(a, 0);
        assert_eq!(jobs.get_all_jobs().len(), 2);
        let removed = jobs.cleanup_done();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, a);
        assert!(jobs.get_job(b).is_some());
    }

    #[test]
    fn test_resolve_specs() {
        let jobs = JobManager::new();
        jobs.add_job(Some(100), "a");
        jobs.add_job(Some(200), "b");
        assert_eq!(jobs.resolve("%1"), Some(1));
        assert_eq!(jobs.resolve("%%"), Some(2));
        assert_eq!(jobs.resolve("%-"), Some(1));
        assert_eq!(jobs.resolve("200"), Some(2));
        assert_eq!(jobs.resolve("%9"), None);
        assert!(jobs.set_current_job(1));
        assert_eq!(jobs.resolve("%+"), Some(1));
    }

    #[tokio::test]
    async fn test_wait_returns_exit_code() {
        let jobs = Arc::new(JobManager::new());
        let id = jobs.add_job(None, "bg");
        let marker = jobs.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            marker.mark_done(id, 7);
        });
        assert_eq!(jobs.wait(id).await, Some(7));
        // already done: returns immediately
        assert_eq!(jobs.wait(id).await, Some(7));
    }

    #[tokio::test]
    async fn test_wait_all_and_missing() {
        let jobs = JobManager::new();
        assert_eq!(jobs.wait_all().await, 0);
        assert_eq!(jobs.wait(42).await, None);
        let a = jobs.add_job(None, "a");
        let b = jobs.add_job(None, "b");
        jobs.mark_done(a, 1);
        jobs.mark_done(b, 2);
        assert_eq!(jobs.wait_all().await, 2);
    }

    #[test]
    fn test_job_info_serializes() {
        fn assert_serialize<T: Serialize>(_: &T) {}
        let jobs = JobManager::new();
        let id = jobs.add_job(Some(5), "sleep 5");
        assert_serialize(&jobs.get_job(id).unwrap());
        assert_eq!(JobStatus::Running.to_string(), "Running");
    }
}
