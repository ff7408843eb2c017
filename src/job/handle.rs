// src/job/handle.rs

//! One submitted job and its blocking wait/resubmit cycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::context::{KeepWaiting, RunContext};
use crate::errors::{JobError, SubmitError};
use crate::fs::FileSystem;
use crate::scheduler::{SchedulerClient, SubmitRequest};
use crate::types::Status;

use super::descriptor::{JobDescriptor, JobId};
use super::resolver::{JobView, StatusResolver};
use super::sentinel::{self, Sentinel};

/// Poll tick and progress cadences of [`JobHandle::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTiming {
    pub poll: Duration,
    /// Progress cadence while waiting for the job to start.
    pub start_every: Duration,
    /// Progress cadence while waiting for the job to finish.
    pub finish_every: Duration,
}

impl Default for WaitTiming {
    fn default() -> Self {
        Self {
            poll: Duration::from_secs(5),
            start_every: Duration::from_secs(20),
            finish_every: Duration::from_secs(10),
        }
    }
}

/// Everything a handle talks to, shared between handles of one run.
#[derive(Debug, Clone)]
pub struct JobServices {
    pub client: Arc<dyn SchedulerClient>,
    pub resolver: Arc<dyn StatusResolver>,
    pub fs: Arc<dyn FileSystem>,
    pub clock: Arc<dyn Clock>,
    pub keep_waiting: KeepWaiting,
    pub timing: WaitTiming,
}

impl JobServices {
    pub fn new(
        client: Arc<dyn SchedulerClient>,
        resolver: Arc<dyn StatusResolver>,
        ctx: &RunContext,
        timing: WaitTiming,
    ) -> Self {
        Self {
            client,
            resolver,
            fs: ctx.fs_arc(),
            clock: ctx.clock_arc(),
            keep_waiting: ctx.keep_waiting().clone(),
            timing,
        }
    }
}

/// Ordering of the forward path `Pending -> Running -> terminal`.
fn progress_rank(status: Status) -> u8 {
    match status {
        Status::Pending | Status::JustResubmitted | Status::Unknown => 0,
        Status::Running => 1,
        Status::Done | Status::Error | Status::PartialFailure => 2,
    }
}

/// A submitted job. Owned by the step that submitted it.
#[derive(Debug)]
pub struct JobHandle {
    descriptor: JobDescriptor,
    work_dir: PathBuf,
    id: Option<JobId>,
    status: Status,
    numtry: u32,
    tasks: Option<Vec<u32>>,
    failed_tasks: Vec<u32>,
    summary: String,
    progress_lines: usize,
    services: JobServices,
}

impl JobHandle {
    /// Submit every task of `descriptor` and return the handle in `Pending`.
    pub fn submit(
        descriptor: JobDescriptor,
        work_dir: impl Into<PathBuf>,
        services: JobServices,
    ) -> Result<Self, SubmitError> {
        let work_dir = work_dir.into();
        let tasks = descriptor.tasks();
        let id = services.client.submit(&SubmitRequest {
            descriptor: &descriptor,
            work_dir: &work_dir,
            tasks: None,
        })?;

        Ok(Self {
            descriptor,
            work_dir,
            id: Some(id),
            status: Status::Pending,
            numtry: 1,
            tasks,
            failed_tasks: Vec::new(),
            summary: String::new(),
            progress_lines: 0,
            services,
        })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn id(&self) -> Option<&JobId> {
        self.id.as_ref()
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn descriptor(&self) -> &JobDescriptor {
        &self.descriptor
    }

    /// Last resolved status, without asking again.
    pub fn current_status(&self) -> Status {
        self.status
    }

    pub fn numtry(&self) -> u32 {
        self.numtry
    }

    pub fn tasks(&self) -> Option<&[u32]> {
        self.tasks.as_deref()
    }

    pub fn failed_tasks(&self) -> &[u32] {
        &self.failed_tasks
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Progress lines logged by the most recent [`wait`](Self::wait).
    pub fn progress_lines(&self) -> usize {
        self.progress_lines
    }

    /// Human-readable identity for error reports.
    pub fn subject(&self) -> String {
        match &self.id {
            Some(id) => format!("job {} ({id})", self.descriptor.name),
            None => format!("job {}", self.descriptor.name),
        }
    }

    /// Resolve, cache and return the current status.
    ///
    /// A resolution that would step back along `Pending -> Running ->
    /// terminal` is ignored; a terminal status only changes on resubmission.
    pub fn status(&mut self) -> Status {
        let resolution = self.services.resolver.resolve(&JobView {
            name: &self.descriptor.name,
            work_dir: &self.work_dir,
            id: self.id.as_ref(),
            tasks: self.tasks.as_deref(),
        });

        let current_rank = progress_rank(self.status);
        let new_rank = progress_rank(resolution.status);
        if new_rank < current_rank || (current_rank == 2 && resolution.status != self.status) {
            debug!(
                job = %self.descriptor.name,
                cached = %self.status,
                resolved = %resolution.status,
                "ignoring backward status"
            );
            return self.status;
        }

        self.status = resolution.status;
        self.summary = resolution.summary;
        if let Some(failed) = resolution.failed_tasks {
            self.failed_tasks = failed;
        }

        if self.status == Status::Done && self.descriptor.cleanup_script {
            self.remove_script();
        }
        self.status
    }

    fn remove_script(&self) {
        let Some(path) = self
            .services
            .client
            .script_path(&self.descriptor, &self.work_dir)
        else {
            return;
        };
        match self.services.fs.remove_file(&path) {
            Ok(true) => debug!(script = ?path, "removed job script"),
            Ok(false) => {}
            Err(err) => warn!(script = ?path, error = %err, "could not remove job script"),
        }
    }

    fn log_progress(&mut self, phase: &str, waited: Duration) {
        self.progress_lines += 1;
        let id = self.id.as_ref().map(JobId::as_str).unwrap_or("-");
        info!(
            job = %self.descriptor.name,
            id,
            waited_secs = waited.as_secs(),
            "Waiting for {} to {}, STATUS: {} {}",
            self.descriptor.name,
            phase,
            self.status,
            self.summary
        );
    }

    /// Block until the job finishes.
    ///
    /// Waits up to `max_total` for the job to start, then up to the job's
    /// wall time for it to finish. Anything short of a terminal status at
    /// the end, including cancellation, is a timeout.
    pub fn wait(&mut self, max_total: Duration) -> Result<Status, JobError> {
        let timing = self.services.timing;
        let tick = timing.poll;
        self.progress_lines = 0;

        let mut waited = Duration::ZERO;
        while self.status.is_waiting_to_start()
            && waited <= max_total
            && self.services.keep_waiting.is_set()
        {
            self.services.clock.sleep(tick);
            waited += tick;
            if on_cadence(waited, timing.start_every) {
                self.log_progress("start", waited);
            }
            self.status();
        }
        let mut total = waited;

        if self.status == Status::Running {
            let deadline =
                Duration::from_secs(u64::from(self.descriptor.resources.walltime_minutes) * 60);
            let mut waited = Duration::ZERO;
            while !self.status.is_terminal()
                && waited <= deadline
                && self.services.keep_waiting.is_set()
            {
                self.services.clock.sleep(tick);
                waited += tick;
                if on_cadence(waited, timing.finish_every) {
                    self.log_progress("finish", waited);
                }
                self.status();
            }
            total += waited;
        }

        if self.status.is_terminal() {
            info!(job = %self.descriptor.name, status = %self.status, "job finished");
            Ok(self.status)
        } else {
            error!(
                job = %self.descriptor.name,
                status = %self.status,
                waited_secs = total.as_secs(),
                "job did not finish in time"
            );
            Err(JobError::Timeout {
                job: self.descriptor.name.clone(),
                waited_secs: total.as_secs(),
            })
        }
    }

    /// Submit the job again if the retry budget allows.
    ///
    /// Ensembles resubmit only the failed tasks. Error sentinels of the failed
    /// tasks are removed, and start sentinels of every current task.
    pub fn resubmit(&mut self) -> Result<bool, SubmitError> {
        let budget = self.descriptor.resources.retry_budget;
        if self.numtry >= budget {
            warn!(job = %self.descriptor.name, tries = self.numtry, budget, "retry budget exhausted");
            return Ok(false);
        }

        self.clear_sentinels()?;

        let tasks = self.tasks.as_ref().map(|current| {
            if self.failed_tasks.is_empty() {
                current.clone()
            } else {
                self.failed_tasks.clone()
            }
        });
        let id = self.services.client.submit(&SubmitRequest {
            descriptor: &self.descriptor,
            work_dir: &self.work_dir,
            tasks: tasks.as_deref(),
        })?;

        info!(
            job = %self.descriptor.name,
            old_id = ?self.id.as_ref().map(JobId::as_str),
            new_id = %id,
            tasks = ?tasks,
            numtry = self.numtry + 1,
            "resubmitted"
        );
        self.id = Some(id);
        self.status = Status::JustResubmitted;
        self.tasks = tasks;
        self.failed_tasks.clear();
        self.summary.clear();
        self.numtry += 1;
        Ok(true)
    }

    fn clear_sentinels(&self) -> Result<(), SubmitError> {
        let Some(id) = &self.id else {
            return Ok(());
        };
        let name = &self.descriptor.name;
        let mut stale = Vec::new();
        match &self.tasks {
            Some(tasks) => {
                for &task in &self.failed_tasks {
                    stale.push(sentinel::task_path(Sentinel::Error, &self.work_dir, name, id, task));
                }
                for &task in tasks {
                    stale.push(sentinel::task_path(Sentinel::Start, &self.work_dir, name, id, task));
                }
            }
            None => {
                stale.push(sentinel::single_path(Sentinel::Error, &self.work_dir, name, id));
                stale.push(sentinel::single_path(Sentinel::Start, &self.work_dir, name, id));
            }
        }

        for path in stale {
            self.services
                .fs
                .remove_file(&path)
                .map_err(|source| SubmitError::Io {
                    job: name.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}

fn on_cadence(waited: Duration, every: Duration) -> bool {
    !every.is_zero() && waited.as_millis() % every.as_millis() == 0
}

/// Wait for a job, resubmitting it on failure until it is done or the retry
/// budget runs out. Timeouts are never retried.
pub fn supervise(handle: &mut JobHandle, max_wait: Duration) -> Result<(), JobError> {
    loop {
        let status = handle.wait(max_wait)?;
        match status {
            Status::Done => return Ok(()),
            Status::Error | Status::PartialFailure => {
                warn!(
                    job = %handle.name(),
                    %status,
                    failed = ?handle.failed_tasks(),
                    "job failed, trying to resubmit"
                );
                if !handle.resubmit()? {
                    return Err(JobError::RetryBudgetExhausted {
                        job: handle.name().to_string(),
                        tries: handle.numtry(),
                    });
                }
            }
            other => {
                return Err(JobError::Failed {
                    job: handle.name().to_string(),
                    status: other,
                });
            }
        }
    }
}
