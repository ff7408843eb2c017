// src/scheduler/slurm.rs

//! SLURM submission (`sbatch`) and status queries (`squeue`, then `sacct`).

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::context::{KeepWaiting, SubmissionCounter};
use crate::errors::SubmitError;
use crate::exec::{CommandOutput, CommandRunner};
use crate::fs::FileSystem;
use crate::job::resolver::{Resolution, StatusQuery};
use crate::job::{JobDescriptor, JobId};
use crate::types::Status;

use super::script::{self, ScriptLayout};
use super::{SchedulerClient, SubmitRequest};

static SUBMITTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Submitted batch job (\d+)").expect("submission pattern is valid")
});

const SOCKET_TIMEOUT: &str = "Socket timed out on send/recv operation";

/// Executables and site conventions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlurmSettings {
    pub sbatch: String,
    pub squeue: String,
    pub sacct: String,
    pub default_partition: String,
    pub script_ext: String,
    /// MPI launcher placed in front of the command.
    pub launcher: String,
    /// Lines inserted after the `#SBATCH` header (module loads, exports).
    pub preamble: Vec<String>,
    /// Pause before retrying a query that hit a socket timeout.
    pub query_backoff: Duration,
}

impl Default for SlurmSettings {
    fn default() -> Self {
        Self {
            sbatch: "sbatch".into(),
            squeue: "squeue".into(),
            sacct: "sacct".into(),
            default_partition: "batch".into(),
            script_ext: "slurm".into(),
            launcher: "srun".into(),
            preamble: Vec::new(),
            query_backoff: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SlurmClient {
    settings: SlurmSettings,
    runner: Arc<dyn CommandRunner>,
    fs: Arc<dyn FileSystem>,
    counter: SubmissionCounter,
}

impl SlurmClient {
    pub fn new(
        settings: SlurmSettings,
        runner: Arc<dyn CommandRunner>,
        fs: Arc<dyn FileSystem>,
        counter: SubmissionCounter,
    ) -> Self {
        Self {
            settings,
            runner,
            fs,
            counter,
        }
    }

    fn array_spec(req: &SubmitRequest<'_>) -> Option<String> {
        if let Some(tasks) = req.tasks {
            let list: Vec<String> = tasks.iter().map(u32::to_string).collect();
            return Some(list.join(","));
        }
        req.descriptor.ensemble.map(|n| format!("0-{n}"))
    }
}

impl SchedulerClient for SlurmClient {
    fn submit(&self, req: &SubmitRequest<'_>) -> Result<JobId, SubmitError> {
        let descriptor = req.descriptor;
        let serial = self.counter.next();
        let layout = ScriptLayout::for_job(descriptor, req.work_dir);
        let script_name = descriptor.script_name(&self.settings.script_ext);
        let script_path = layout.script_dir.join(&script_name);

        let text = script::render(descriptor, &layout, &self.settings);
        self.fs
            .write(&script_path, text.as_bytes())
            .map_err(|source| SubmitError::Io {
                job: descriptor.name.clone(),
                source,
            })?;
        info!(serial, job = %descriptor.name, script = %script_name, "- {serial:02} - job script generated");

        let mut args = Vec::new();
        if let Some(spec) = Self::array_spec(req) {
            args.push("-a".to_string());
            args.push(spec);
        }
        args.push(script_name);
        let command = format!("{} {}", self.settings.sbatch, args.join(" "));

        let output = self
            .runner
            .run(&self.settings.sbatch, &args, Some(&layout.script_dir))
            .map_err(|source| SubmitError::Spawn {
                command: command.clone(),
                source,
            })?;
        trace!(stdout = %output.stdout, stderr = %output.stderr, "sbatch output");

        match parse_job_id(&output.stdout) {
            Some(id) => {
                info!(serial, job = %descriptor.name, %id, "submitted");
                Ok(id)
            }
            None => Err(SubmitError::NoJobId {
                job: descriptor.name.clone(),
                command,
                output: format!("{}{}", output.stdout, output.stderr),
            }),
        }
    }

    fn script_path(&self, descriptor: &JobDescriptor, work_dir: &Path) -> Option<PathBuf> {
        let layout = ScriptLayout::for_job(descriptor, work_dir);
        Some(
            layout
                .script_dir
                .join(descriptor.script_name(&self.settings.script_ext)),
        )
    }
}

/// Extract the job id from `sbatch` stdout.
pub fn parse_job_id(stdout: &str) -> Option<JobId> {
    SUBMITTED
        .captures(stdout)
        .and_then(|caps| caps.get(1))
        .map(|m| JobId::new(m.as_str()))
}

/// Status lookup through `squeue`, falling back to `sacct`.
///
/// Socket timeouts from the scheduler front end are retried after
/// `query_backoff` until they clear or the run is cancelled.
#[derive(Debug, Clone)]
pub struct SlurmQuery {
    settings: SlurmSettings,
    runner: Arc<dyn CommandRunner>,
    clock: Arc<dyn Clock>,
    keep_waiting: KeepWaiting,
}

impl SlurmQuery {
    pub fn new(
        settings: SlurmSettings,
        runner: Arc<dyn CommandRunner>,
        clock: Arc<dyn Clock>,
        keep_waiting: KeepWaiting,
    ) -> Self {
        Self {
            settings,
            runner,
            clock,
            keep_waiting,
        }
    }

    /// Run a query command; `None` if it could not be run or the run was
    /// cancelled while the scheduler kept timing out.
    fn run_retrying(&self, program: &str, args: &[String]) -> Option<CommandOutput> {
        loop {
            match self.runner.run(program, args, None) {
                Ok(out) if is_socket_timeout(&out) => {
                    if !self.keep_waiting.is_set() {
                        return None;
                    }
                    debug!(program, "scheduler socket timeout, retrying");
                    self.clock.sleep(self.settings.query_backoff);
                }
                Ok(out) => return Some(out),
                Err(err) => {
                    warn!(program, error = %err, "status query could not be run");
                    return None;
                }
            }
        }
    }
}

impl StatusQuery for SlurmQuery {
    fn query(&self, id: &JobId) -> Resolution {
        let args: Vec<String> = ["-h", "-o", "%10i %.2t", "-j", id.as_str()]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let Some(out) = self.run_retrying(&self.settings.squeue, &args) else {
            return Resolution::plain(Status::Unknown);
        };
        // Finished array tasks drop out of `squeue`, so only `sacct` can
        // tell a finished job apart from a partially failed one.
        let queued = squeue_resolution(&out.stdout, id);
        if let Some(res) = queued.as_ref().filter(|r| !r.status.is_terminal()) {
            return res.clone();
        }

        let args: Vec<String> = ["-o", "JobID,state", "-n", "-j", id.as_str()]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let Some(out) = self.run_retrying(&self.settings.sacct, &args) else {
            return queued.unwrap_or_else(|| Resolution::plain(Status::Unknown));
        };
        match sacct_resolution(&out.stdout, id).or(queued) {
            Some(res) => res,
            None => {
                warn!(%id, output = %out.stdout.trim(), "job not found by squeue or sacct");
                Resolution::plain(Status::Unknown)
            }
        }
    }
}

fn is_socket_timeout(out: &CommandOutput) -> bool {
    out.stderr.contains(SOCKET_TIMEOUT) || out.stdout.contains(SOCKET_TIMEOUT)
}

/// Which part of a job a listing line is about.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Listed {
    /// The job itself, not an array.
    Job,
    /// Array tasks. Empty when a bracketed range could not be read.
    Tasks(Vec<u32>),
}

/// Lines belonging to `id`: the job itself and its array tasks.
/// Job steps (`.batch`, `.extern`, `.0`) are skipped.
fn listed_states<'a>(stdout: &'a str, id: &JobId) -> Vec<(Listed, &'a str)> {
    let task_prefix = format!("{id}_");
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let job = fields.next()?;
            let state = fields.next()?;
            if job == id.as_str() {
                return Some((Listed::Job, state));
            }
            let rest = job.strip_prefix(&task_prefix)?;
            if rest.contains('.') {
                return None;
            }
            Some((Listed::Tasks(task_indices(rest)), state))
        })
        .collect()
}

/// `3` or a pending range such as `[1-3,7%2]`.
fn task_indices(spec: &str) -> Vec<u32> {
    if let Ok(task) = spec.parse() {
        return vec![task];
    }
    let Some(inner) = spec.strip_prefix('[').and_then(|s| s.strip_suffix(']')) else {
        return Vec::new();
    };
    let inner = inner.split('%').next().unwrap_or_default();
    let mut tasks = Vec::new();
    for part in inner.split(',') {
        let parsed = match part.split_once('-') {
            Some((lo, hi)) => lo.parse::<u32>().ok().zip(hi.parse::<u32>().ok()),
            None => part.parse::<u32>().ok().map(|t| (t, t)),
        };
        match parsed {
            Some((lo, hi)) => tasks.extend(lo..=hi),
            None => return Vec::new(),
        }
    }
    tasks
}

/// Fold the listed lines into one status.
///
/// A plain job takes the state of its own line. An array is done when every
/// listed task is done, failed when every task failed, partially failed when
/// done and failed tasks cover all of them, pending while any task is queued
/// and running otherwise.
fn aggregate(listed: Vec<(Listed, Status)>) -> Option<Resolution> {
    let mut done = Vec::new();
    let mut failed = Vec::new();
    let mut others = Vec::new();
    let mut queued = 0usize;
    let mut running = 0usize;
    let mut job_status = None;

    for (what, status) in listed {
        let tasks = match what {
            Listed::Job => {
                job_status.get_or_insert(status);
                continue;
            }
            Listed::Tasks(tasks) if tasks.is_empty() => {
                // Unreadable range; only ever printed for queued tasks.
                queued += 1;
                continue;
            }
            Listed::Tasks(tasks) => tasks,
        };
        match status {
            Status::Done => done.extend(tasks),
            Status::Error => failed.extend(tasks),
            Status::Pending => {
                queued += tasks.len();
                others.extend(tasks);
            }
            _ => {
                running += tasks.len();
                others.extend(tasks);
            }
        }
    }

    if done.is_empty() && failed.is_empty() && others.is_empty() && queued == 0 {
        return job_status.map(Resolution::plain);
    }

    let summary = format!(
        "(done:{}; fail:{:?}; queued:{}; run:{})",
        done.len(),
        failed,
        queued,
        running
    );
    let (status, failed_tasks) = if queued > 0 {
        (Status::Pending, None)
    } else if others.is_empty() && failed.is_empty() {
        (Status::Done, Some(Vec::new()))
    } else if others.is_empty() && done.is_empty() {
        (Status::Error, Some(failed))
    } else if others.is_empty() {
        (Status::PartialFailure, Some(failed))
    } else {
        let mut not_done = failed;
        not_done.extend(others);
        not_done.sort_unstable();
        (Status::Running, Some(not_done))
    };

    Some(Resolution {
        status,
        failed_tasks,
        summary,
    })
}

fn squeue_code(code: &str) -> Status {
    match code {
        "CD" => Status::Done,
        "PD" | "CF" => Status::Pending,
        "R" | "CG" => Status::Running,
        "CA" | "F" | "TO" | "NF" => Status::Error,
        _ => Status::Unknown,
    }
}

fn sacct_state(state: &str) -> Status {
    match state {
        "COMPLETED" => Status::Done,
        "PENDING" => Status::Pending,
        "RUNNING" | "COMPLETING" => Status::Running,
        "FAILED" | "TIMEOUT" | "NODE_FAIL" | "OUT_OF_MEMORY" => Status::Error,
        s if s.starts_with("CANCELLED") => Status::Error,
        _ => Status::Unknown,
    }
}

/// `squeue` listing of `id` and its tasks; `None` when nothing is listed.
pub fn squeue_resolution(stdout: &str, id: &JobId) -> Option<Resolution> {
    aggregate(
        listed_states(stdout, id)
            .into_iter()
            .map(|(what, code)| (what, squeue_code(code)))
            .collect(),
    )
}

/// `sacct` listing of `id` and its tasks; `None` when nothing is listed.
pub fn sacct_resolution(stdout: &str, id: &JobId) -> Option<Resolution> {
    aggregate(
        listed_states(stdout, id)
            .into_iter()
            .map(|(what, state)| (what, sacct_state(state)))
            .collect(),
    )
}

/// Map `squeue` short codes; `None` when the job is not listed.
pub fn parse_squeue(stdout: &str, id: &JobId) -> Option<Status> {
    squeue_resolution(stdout, id).map(|r| r.status)
}

/// Map `sacct` long states; `None` when the job is not listed.
pub fn parse_sacct(stdout: &str, id: &JobId) -> Option<Status> {
    sacct_resolution(stdout, id).map(|r| r.status)
}
