use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cyclerun::clock::ManualClock;
use cyclerun::errors::SubmitError;
use cyclerun::exec::{CommandOutput, CommandRunner};
use cyclerun::job::{JobDescriptor, JobId, Resolution, StatusQuery};
use cyclerun::scheduler::{SchedulerClient, SubmitRequest};
use cyclerun::types::Status;

/// One recorded submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub job: String,
    pub work_dir: PathBuf,
    pub tasks: Option<Vec<u32>>,
}

/// A fake scheduler that:
/// - records every submission
/// - hands out ids `first_id`, `first_id + 1`, ...
/// - optionally refuses jobs by name, like `sbatch` printing no job id.
#[derive(Debug)]
pub struct RecordingClient {
    next_id: Mutex<u64>,
    refuse: Vec<String>,
    submissions: Mutex<Vec<Submission>>,
}

impl RecordingClient {
    pub fn new(first_id: u64) -> Arc<Self> {
        Self::refusing(first_id, &[])
    }

    pub fn refusing(first_id: u64, jobs: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            next_id: Mutex::new(first_id),
            refuse: jobs.iter().map(|s| s.to_string()).collect(),
            submissions: Mutex::new(Vec::new()),
        })
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }
}

impl SchedulerClient for RecordingClient {
    fn submit(&self, req: &SubmitRequest<'_>) -> Result<JobId, SubmitError> {
        let job = req.descriptor.name.clone();
        self.submissions.lock().unwrap().push(Submission {
            job: job.clone(),
            work_dir: req.work_dir.to_path_buf(),
            tasks: req.tasks.map(<[u32]>::to_vec),
        });
        if self.refuse.contains(&job) {
            return Err(SubmitError::NoJobId {
                job,
                command: "sbatch".to_string(),
                output: "sbatch: error: Batch job submission failed".to_string(),
            });
        }
        let mut next = self.next_id.lock().unwrap();
        let id = JobId::new(next.to_string());
        *next += 1;
        Ok(id)
    }

    fn script_path(&self, descriptor: &JobDescriptor, work_dir: &Path) -> Option<PathBuf> {
        Some(work_dir.join(descriptor.script_name("slurm")))
    }
}

/// Scheduler state as a function of time on a [`ManualClock`].
///
/// `timeline` holds `(from, status)` pairs in ascending order; the status of
/// the last pair whose `from` has passed is reported, `Pending` before that.
#[derive(Debug)]
pub struct TimelineQuery {
    clock: ManualClock,
    timeline: Vec<(Duration, Status)>,
    calls: Mutex<usize>,
}

impl TimelineQuery {
    pub fn new(clock: ManualClock, timeline: &[(u64, Status)]) -> Arc<Self> {
        Arc::new(Self {
            clock,
            timeline: timeline
                .iter()
                .map(|&(secs, s)| (Duration::from_secs(secs), s))
                .collect(),
            calls: Mutex::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl StatusQuery for TimelineQuery {
    fn query(&self, _id: &JobId) -> Resolution {
        *self.calls.lock().unwrap() += 1;
        let elapsed = self.clock.elapsed();
        let status = self
            .timeline
            .iter()
            .take_while(|(from, _)| *from <= elapsed)
            .last()
            .map(|(_, s)| *s)
            .unwrap_or(Status::Pending);
        Resolution::plain(status)
    }
}

type Reply = dyn Fn(&str, &[String]) -> io::Result<CommandOutput> + Send + Sync;

/// A [`CommandRunner`] answering from a closure and recording every call.
pub struct FnRunner {
    reply: Box<Reply>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl FnRunner {
    pub fn new(
        reply: impl Fn(&str, &[String]) -> io::Result<CommandOutput> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            reply: Box::new(reply),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Programs called, in order.
    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|(p, _)| p).collect()
    }
}

impl fmt::Debug for FnRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRunner")
            .field("calls", &self.calls.lock().map(|c| c.len()).unwrap_or(0))
            .finish()
    }
}

impl CommandRunner for FnRunner {
    fn run(&self, program: &str, args: &[String], _cwd: Option<&Path>) -> io::Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));
        (self.reply)(program, args)
    }
}
